use super::notifier::NOTIFY_KEY;
use super::{Interest, ReadinessPoll, timeout_to_timespec};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use std::{io, ptr};

const NOTIFY_IDENT: usize = NOTIFY_KEY as usize;

pub(crate) struct OsPoller {
  kq_fd: OwnedFd,
}

impl OsPoller {
  pub fn new() -> io::Result<Self> {
    let kq_fd = unsafe { OwnedFd::from_raw_fd(syscall!(kqueue())?) };
    syscall!(fcntl(kq_fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC))?;
    let poller = Self { kq_fd };

    // EV_CLEAR resets the user event once it has been reported.
    poller.apply(&libc::kevent {
      ident: NOTIFY_IDENT as libc::uintptr_t,
      filter: libc::EVFILT_USER,
      flags: libc::EV_ADD | libc::EV_ENABLE | libc::EV_CLEAR,
      fflags: 0,
      data: 0,
      udata: NOTIFY_IDENT as *mut libc::c_void,
    })?;

    Ok(poller)
  }

  fn apply(&self, change: &libc::kevent) -> io::Result<()> {
    syscall!(kevent(
      self.kq_fd.as_raw_fd(),
      change as *const libc::kevent,
      1,
      ptr::null_mut(),
      0,
      ptr::null(),
    ))?;
    Ok(())
  }

  fn arm(&self, fd: RawFd, key: u64, filter: i16) -> io::Result<()> {
    self.apply(&libc::kevent {
      ident: fd as libc::uintptr_t,
      filter,
      flags: libc::EV_ADD | libc::EV_ENABLE | libc::EV_ONESHOT,
      fflags: 0,
      data: 0,
      udata: key as usize as *mut libc::c_void,
    })
  }

  fn disarm(&self, fd: RawFd, filter: i16) -> io::Result<()> {
    let res = self.apply(&libc::kevent {
      ident: fd as libc::uintptr_t,
      filter,
      flags: libc::EV_DELETE,
      fflags: 0,
      data: 0,
      udata: ptr::null_mut(),
    });

    match res {
      // One-shot filters that already fired are gone.
      Err(err) if err.raw_os_error() == Some(libc::ENOENT) => Ok(()),
      other => other,
    }
  }
}

impl ReadinessPoll for OsPoller {
  type NativeEvent = libc::kevent;

  fn add(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
    self.modify(fd, key, interest)
  }

  fn modify(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
    if interest.is_readable() {
      self.arm(fd, key, libc::EVFILT_READ)?;
    } else {
      self.disarm(fd, libc::EVFILT_READ)?;
    }
    if interest.is_writable() {
      self.arm(fd, key, libc::EVFILT_WRITE)?;
    } else {
      self.disarm(fd, libc::EVFILT_WRITE)?;
    }
    Ok(())
  }

  fn delete(&self, fd: RawFd) -> io::Result<()> {
    self.disarm(fd, libc::EVFILT_READ)?;
    self.disarm(fd, libc::EVFILT_WRITE)
  }

  fn wait(
    &self,
    events: &mut [Self::NativeEvent],
    timeout: Option<Duration>,
  ) -> io::Result<usize> {
    let timeout = timeout_to_timespec(timeout);
    let timeout_ptr = timeout
      .as_ref()
      .map_or(ptr::null(), |ts| ts as *const libc::timespec);

    let n = syscall!(kevent(
      self.kq_fd.as_raw_fd(),
      ptr::null(),
      0,
      events.as_mut_ptr(),
      events.len() as i32,
      timeout_ptr,
    ))?;
    Ok(n as usize)
  }

  fn notify(&self) -> io::Result<()> {
    self.apply(&libc::kevent {
      ident: NOTIFY_IDENT as libc::uintptr_t,
      filter: libc::EVFILT_USER,
      flags: 0,
      fflags: libc::NOTE_TRIGGER,
      data: 0,
      udata: NOTIFY_IDENT as *mut libc::c_void,
    })
  }

  fn clear_notify(&self) -> io::Result<()> {
    Ok(())
  }

  fn event_key(event: &Self::NativeEvent) -> u64 {
    event.udata as usize as u64
  }

  fn event_interest(event: &Self::NativeEvent) -> Interest {
    match event.filter {
      libc::EVFILT_READ => Interest::READ,
      libc::EVFILT_WRITE => Interest::WRITE,
      _ => Interest::NONE,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  crate::sys::tests::poller_tests!(OsPoller::new().unwrap());
}

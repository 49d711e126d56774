use super::notifier::{NOTIFY_KEY, Notifier};
use super::{Interest, ReadinessPoll};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use std::{io, ptr};

pub(crate) struct OsPoller {
  epoll_fd: OwnedFd,
  notifier: Notifier,
}

impl OsPoller {
  pub fn new() -> io::Result<Self> {
    let epoll_fd = unsafe {
      let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
      OwnedFd::from_raw_fd(fd)
    };
    let notifier = Notifier::new()?;

    let mut event =
      libc::epoll_event { events: libc::EPOLLIN as u32, u64: NOTIFY_KEY };
    syscall!(epoll_ctl(
      epoll_fd.as_raw_fd(),
      libc::EPOLL_CTL_ADD,
      notifier.read_fd(),
      &mut event as *mut libc::epoll_event,
    ))?;

    Ok(Self { epoll_fd, notifier })
  }

  fn ctl(&self, op: libc::c_int, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
    debug_assert_ne!(key, NOTIFY_KEY);
    let mut events = libc::EPOLLONESHOT as u32;
    if interest.is_readable() {
      events |= (libc::EPOLLIN | libc::EPOLLRDHUP) as u32;
    }
    if interest.is_writable() {
      events |= libc::EPOLLOUT as u32;
    }

    let mut event = libc::epoll_event { events, u64: key };
    syscall!(epoll_ctl(
      self.epoll_fd.as_raw_fd(),
      op,
      fd,
      &mut event as *mut libc::epoll_event,
    ))?;
    Ok(())
  }
}

impl ReadinessPoll for OsPoller {
  type NativeEvent = libc::epoll_event;

  fn add(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
    self.ctl(libc::EPOLL_CTL_ADD, fd, key, interest)
  }

  fn modify(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()> {
    self.ctl(libc::EPOLL_CTL_MOD, fd, key, interest)
  }

  fn delete(&self, fd: RawFd) -> io::Result<()> {
    syscall!(epoll_ctl(
      self.epoll_fd.as_raw_fd(),
      libc::EPOLL_CTL_DEL,
      fd,
      ptr::null_mut(),
    ))?;
    Ok(())
  }

  fn wait(
    &self,
    events: &mut [Self::NativeEvent],
    timeout: Option<Duration>,
  ) -> io::Result<usize> {
    let timeout_ms = match timeout {
      // Round up so a sub-millisecond timeout does not spin.
      Some(d) => d
        .as_nanos()
        .div_ceil(1_000_000)
        .min(i32::MAX as u128) as i32,
      None => -1,
    };

    let n = syscall!(epoll_wait(
      self.epoll_fd.as_raw_fd(),
      events.as_mut_ptr(),
      events.len() as i32,
      timeout_ms,
    ))?;
    Ok(n as usize)
  }

  fn notify(&self) -> io::Result<()> {
    self.notifier.notify()
  }

  fn clear_notify(&self) -> io::Result<()> {
    self.notifier.drain()
  }

  fn event_key(event: &Self::NativeEvent) -> u64 {
    event.u64
  }

  fn event_interest(event: &Self::NativeEvent) -> Interest {
    let flags = event.events;
    // Errors and hangups wake both directions; the retried syscall reports
    // the actual condition.
    let broken = flags & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0;
    let mut interest = Interest::NONE;
    if broken || flags & (libc::EPOLLIN | libc::EPOLLRDHUP) as u32 != 0 {
      interest |= Interest::READ;
    }
    if broken || flags & libc::EPOLLOUT as u32 != 0 {
      interest |= Interest::WRITE;
    }
    interest
  }
}

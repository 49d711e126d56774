//! Wakeup channel into a blocked poller.
//!
//! kqueue has `EVFILT_USER` and needs nothing here. epoll gets a non-blocking
//! pipe whose read end is registered level-triggered under [`NOTIFY_KEY`].

/// Key reserved for wakeup events. Descriptor keys never reach it.
pub(crate) const NOTIFY_KEY: u64 = u64::MAX;

#[cfg(linux)]
pub(crate) use pipe::Notifier;

#[cfg(linux)]
mod pipe {
  use std::io;
  use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

  pub(crate) struct Notifier {
    read_fd: OwnedFd,
    write_fd: OwnedFd,
  }

  impl Notifier {
    pub fn new() -> io::Result<Self> {
      let mut fds = [0i32; 2];
      syscall!(pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK))?;

      Ok(Self {
        read_fd: unsafe { OwnedFd::from_raw_fd(fds[0]) },
        write_fd: unsafe { OwnedFd::from_raw_fd(fds[1]) },
      })
    }

    pub fn read_fd(&self) -> RawFd {
      self.read_fd.as_raw_fd()
    }

    pub fn notify(&self) -> io::Result<()> {
      let byte: u8 = 1;
      let res = syscall!(write(
        self.write_fd.as_raw_fd(),
        &byte as *const u8 as *const libc::c_void,
        1,
      ));

      match res {
        // A full pipe already guarantees a pending wakeup.
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
        other => other.map(|_| ()),
      }
    }

    /// Empties the pipe so the level-triggered registration goes quiet.
    pub fn drain(&self) -> io::Result<()> {
      let mut scratch = [0u8; 64];
      loop {
        let res = syscall!(read(
          self.read_fd.as_raw_fd(),
          scratch.as_mut_ptr() as *mut libc::c_void,
          scratch.len(),
        ));
        match res {
          Ok(0) => return Ok(()),
          Ok(_) => continue,
          Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
          Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
          Err(err) => return Err(err),
        }
      }
    }
  }
}

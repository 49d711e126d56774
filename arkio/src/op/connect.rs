use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;

use super::{Intent, Operation};
use crate::error::Result;
use crate::net::addr::RawAddr;

/// Non-blocking `connect(2)`.
///
/// The call is started at submission; writability then means the handshake
/// finished and `SO_ERROR` holds its outcome.
pub struct Connect {
  addr: RawAddr,
  started: bool,
}

impl Connect {
  pub fn new(addr: SocketAddr) -> Self {
    Self { addr: addr.into(), started: false }
  }
}

impl Operation for Connect {
  type Output = Result<()>;

  const INTENT: Intent = Intent::Connect;
  const EAGER: bool = true;

  fn attempt(&mut self, fd: RawFd) -> io::Result<usize> {
    if !self.started {
      self.started = true;
      syscall!(connect(fd, self.addr.as_ptr(), self.addr.len()))?;
      return Ok(0);
    }

    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    syscall!(getsockopt(
      fd,
      libc::SOL_SOCKET,
      libc::SO_ERROR,
      &mut err as *mut libc::c_int as *mut libc::c_void,
      &mut len,
    ))?;
    if err != 0 {
      return Err(io::Error::from_raw_os_error(err));
    }

    // A spurious wakeup leaves SO_ERROR clear while still connecting.
    let mut peer = RawAddr::empty();
    match syscall!(getpeername(fd, peer.as_mut_ptr(), peer.len_mut())) {
      Err(err) if err.raw_os_error() == Some(libc::ENOTCONN) => {
        Err(io::ErrorKind::WouldBlock.into())
      }
      res => res.map(|_| 0),
    }
  }

  fn complete(self, res: Result<usize>) -> Self::Output {
    res.map(|_| ())
  }
}

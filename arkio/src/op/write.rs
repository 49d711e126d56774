use std::io;
use std::os::fd::RawFd;

use super::{Intent, Operation};
use crate::buf::{BufResult, IoBuf};
use crate::error::Result;

/// One `write(2)` of `buf[start..start + len]`.
///
/// Sockets are written with `send(MSG_NOSIGNAL)` where available, so a
/// closed peer shows up as `EPIPE` instead of a signal.
pub struct WriteSome<B> {
  buf: B,
  start: usize,
  len: usize,
  #[cfg(linux)]
  socket: bool,
}

impl<B: IoBuf> WriteSome<B> {
  pub fn new(buf: B) -> Self {
    let len = buf.buf_len();
    Self::window(buf, 0, len)
  }

  /// # Panics
  ///
  /// If the window does not fit in `buf`.
  pub fn window(buf: B, start: usize, len: usize) -> Self {
    assert!(
      start.checked_add(len).is_some_and(|end| end <= buf.buf_len()),
      "write window {start}+{len} exceeds buffer of {}",
      buf.buf_len()
    );
    Self {
      buf,
      start,
      len,
      #[cfg(linux)]
      socket: true,
    }
  }

  pub fn into_inner(self) -> B {
    self.buf
  }
}

impl<B: IoBuf> Operation for WriteSome<B> {
  type Output = BufResult<usize, B>;

  const INTENT: Intent = Intent::Write;

  fn attempt(&mut self, fd: RawFd) -> io::Result<usize> {
    let region = &self.buf.buf()[self.start..self.start + self.len];
    #[cfg(linux)]
    let res = write_bytes(fd, region, &mut self.socket);
    #[cfg(not(linux))]
    let res = write_bytes(fd, region);
    res
  }

  fn complete(self, res: Result<usize>) -> Self::Output {
    (res, self.buf)
  }
}

/// Writes `bytes` once. Clears `socket` the first time `fd` turns out not
/// to be a socket and falls back to `write(2)` from then on.
#[cfg(linux)]
pub(crate) fn write_bytes(
  fd: RawFd,
  bytes: &[u8],
  socket: &mut bool,
) -> io::Result<usize> {
  let ptr = bytes.as_ptr() as *const libc::c_void;
  if *socket {
    match syscall!(send(fd, ptr, bytes.len(), libc::MSG_NOSIGNAL)) {
      Err(err) if err.raw_os_error() == Some(libc::ENOTSOCK) => *socket = false,
      res => return res.map(|n| n as usize),
    }
  }
  let n = syscall!(write(fd, ptr, bytes.len()))?;
  Ok(n as usize)
}

/// Writes `bytes` once. Sockets carry `SO_NOSIGPIPE` here.
#[cfg(not(linux))]
pub(crate) fn write_bytes(fd: RawFd, bytes: &[u8]) -> io::Result<usize> {
  let n = syscall!(write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()))?;
  Ok(n as usize)
}

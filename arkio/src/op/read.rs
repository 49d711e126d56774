use std::io;
use std::os::fd::RawFd;

use super::{Intent, Operation};
use crate::buf::{BufResult, IoBufMut};
use crate::error::Result;

/// One `read(2)` into `buf[start..start + len]`.
pub struct ReadSome<B> {
  buf: B,
  start: usize,
  len: usize,
}

impl<B: IoBufMut> ReadSome<B> {
  /// Reads into the whole buffer.
  pub fn new(buf: B) -> Self {
    let len = buf.buf_len();
    Self { buf, start: 0, len }
  }

  /// # Panics
  ///
  /// If the window does not fit in `buf`.
  pub fn window(buf: B, start: usize, len: usize) -> Self {
    assert!(
      start.checked_add(len).is_some_and(|end| end <= buf.buf_len()),
      "read window {start}+{len} exceeds buffer of {}",
      buf.buf_len()
    );
    Self { buf, start, len }
  }

  pub fn into_inner(self) -> B {
    self.buf
  }
}

impl<B: IoBufMut> Operation for ReadSome<B> {
  type Output = BufResult<usize, B>;

  const INTENT: Intent = Intent::Read;

  fn attempt(&mut self, fd: RawFd) -> io::Result<usize> {
    let region = &mut self.buf.buf_mut()[self.start..self.start + self.len];
    let n = syscall!(read(
      fd,
      region.as_mut_ptr() as *mut libc::c_void,
      region.len()
    ))?;
    Ok(n as usize)
  }

  fn complete(self, res: Result<usize>) -> Self::Output {
    (res, self.buf)
  }
}

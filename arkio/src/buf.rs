//! Buffers handed to the context for the duration of an operation.
//!
//! Operations take their buffer by value and give it back together with the
//! outcome, so the memory stays valid while the OS may still write into it.
//! The region an operation works on is the buffer's full initialized length:
//! `Vec::with_capacity(n)` is an empty region, `vec![0; n]` is `n` bytes.

use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Result of an operation that owned a buffer. The buffer comes back
/// whether the operation succeeded or not.
pub type BufResult<T, B> = (Result<T>, B);

/// A buffer that can be the source of a write.
pub trait IoBuf: 'static {
  fn buf(&self) -> &[u8];

  fn buf_len(&self) -> usize {
    self.buf().len()
  }
}

/// A buffer that can be the destination of a read.
pub trait IoBufMut: IoBuf {
  fn buf_mut(&mut self) -> &mut [u8];
}

impl IoBuf for Vec<u8> {
  fn buf(&self) -> &[u8] {
    self
  }
}

impl IoBufMut for Vec<u8> {
  fn buf_mut(&mut self) -> &mut [u8] {
    self
  }
}

impl IoBuf for Box<[u8]> {
  fn buf(&self) -> &[u8] {
    self
  }
}

impl IoBufMut for Box<[u8]> {
  fn buf_mut(&mut self) -> &mut [u8] {
    self
  }
}

impl<const N: usize> IoBuf for [u8; N] {
  fn buf(&self) -> &[u8] {
    self
  }
}

impl<const N: usize> IoBufMut for [u8; N] {
  fn buf_mut(&mut self) -> &mut [u8] {
    self
  }
}

impl IoBuf for String {
  fn buf(&self) -> &[u8] {
    self.as_bytes()
  }
}

impl IoBuf for &'static str {
  fn buf(&self) -> &[u8] {
    self.as_bytes()
  }
}

impl IoBuf for &'static [u8] {
  fn buf(&self) -> &[u8] {
    self
  }
}

impl<const N: usize> IoBuf for &'static [u8; N] {
  fn buf(&self) -> &[u8] {
    *self
  }
}

#[cfg(feature = "bytes")]
impl IoBuf for bytes::Bytes {
  fn buf(&self) -> &[u8] {
    self
  }
}

#[cfg(feature = "bytes")]
impl IoBuf for bytes::BytesMut {
  fn buf(&self) -> &[u8] {
    self
  }
}

#[cfg(feature = "bytes")]
impl IoBufMut for bytes::BytesMut {
  fn buf_mut(&mut self) -> &mut [u8] {
    self
  }
}

/// A sub-range of an owned buffer.
///
/// ```
/// use arkio::buf::{IoBuf, IoBufExt};
///
/// let slice = b"hello world".to_vec().slice(6..);
/// assert_eq!(slice.buf(), b"world");
/// assert_eq!(slice.into_inner().len(), 11);
/// ```
#[derive(Debug, Clone)]
pub struct Slice<B> {
  inner: B,
  begin: usize,
  end: usize,
}

impl<B: IoBuf> Slice<B> {
  /// # Panics
  ///
  /// If `range` is out of bounds for `inner`.
  pub fn new(inner: B, range: impl RangeBounds<usize>) -> Self {
    let len = inner.buf_len();
    let begin = match range.start_bound() {
      Bound::Included(&n) => n,
      Bound::Excluded(&n) => n + 1,
      Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
      Bound::Included(&n) => n + 1,
      Bound::Excluded(&n) => n,
      Bound::Unbounded => len,
    };
    assert!(begin <= end, "slice starts at {begin} but ends at {end}");
    assert!(end <= len, "slice end {end} out of range for buffer of length {len}");
    Self { inner, begin, end }
  }

  pub fn begin(&self) -> usize {
    self.begin
  }

  pub fn end(&self) -> usize {
    self.end
  }

  pub fn get_ref(&self) -> &B {
    &self.inner
  }

  pub fn into_inner(self) -> B {
    self.inner
  }
}

impl<B: IoBuf> IoBuf for Slice<B> {
  fn buf(&self) -> &[u8] {
    &self.inner.buf()[self.begin..self.end]
  }
}

impl<B: IoBufMut> IoBufMut for Slice<B> {
  fn buf_mut(&mut self) -> &mut [u8] {
    &mut self.inner.buf_mut()[self.begin..self.end]
  }
}

pub trait IoBufExt: IoBuf + Sized {
  /// Restricts I/O to `range` of this buffer.
  fn slice(self, range: impl RangeBounds<usize>) -> Slice<Self> {
    Slice::new(self, range)
  }
}

impl<B: IoBuf> IoBufExt for B {}

//! Policies deciding when a composite read or write is finished.
//!
//! After every partial transfer the composite loop asks its condition
//! [`next`](CompletionCondition::next) with the whole buffer region and the
//! number of bytes moved so far. The answer is one of:
//!
//! - `Ok(0)`: the transfer is complete,
//! - `Ok(k)`: keep going, asking the OS for at most `k` more bytes,
//! - `Err(code)`: the condition cannot be satisfied; the code is delivered.
//!
//! All built-in policies return `Ok(0)` once the buffer is exhausted.

use crate::error::{ConfigError, Result};

pub trait CompletionCondition {
  fn next(&mut self, buf: &[u8], done: usize) -> Result<usize>;
}

impl<F> CompletionCondition for F
where
  F: FnMut(&[u8], usize) -> Result<usize>,
{
  fn next(&mut self, buf: &[u8], done: usize) -> Result<usize> {
    self(buf, done)
  }
}

/// Transfer until the buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferAll;

/// Transfer until at least `n` bytes moved, or the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferAtLeast(pub usize);

/// Transfer exactly `n` bytes.
///
/// A target larger than the buffer is rejected with
/// [`ConfigError::ExactlyOvershoot`] rather than silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferExactly(pub usize);

pub const fn transfer_all() -> TransferAll {
  TransferAll
}

pub const fn transfer_at_least(n: usize) -> TransferAtLeast {
  TransferAtLeast(n)
}

pub const fn transfer_exactly(n: usize) -> TransferExactly {
  TransferExactly(n)
}

impl CompletionCondition for TransferAll {
  fn next(&mut self, buf: &[u8], done: usize) -> Result<usize> {
    Ok(buf.len().saturating_sub(done))
  }
}

impl CompletionCondition for TransferAtLeast {
  fn next(&mut self, buf: &[u8], done: usize) -> Result<usize> {
    if done < self.0.min(buf.len()) { Ok(buf.len() - done) } else { Ok(0) }
  }
}

impl CompletionCondition for TransferExactly {
  fn next(&mut self, buf: &[u8], done: usize) -> Result<usize> {
    if self.0 > buf.len() {
      return Err(ConfigError::ExactlyOvershoot.into());
    }
    Ok(self.0.saturating_sub(done))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn transfer_all_requests_remaining() {
    let buf = [0u8; 10];
    assert_eq!(transfer_all().next(&buf, 0), Ok(10));
    assert_eq!(transfer_all().next(&buf, 7), Ok(3));
    assert_eq!(transfer_all().next(&buf, 10), Ok(0));
    assert_eq!(transfer_all().next(&[], 0), Ok(0));
  }

  #[test]
  fn at_least_stops_after_threshold() {
    let buf = [0u8; 10];
    assert_eq!(transfer_at_least(4).next(&buf, 0), Ok(10));
    assert_eq!(transfer_at_least(4).next(&buf, 3), Ok(7));
    assert_eq!(transfer_at_least(4).next(&buf, 4), Ok(0));
    assert_eq!(transfer_at_least(0).next(&buf, 0), Ok(0));
  }

  #[test]
  fn exactly_never_requests_past_target() {
    let buf = [0u8; 10];
    assert_eq!(transfer_exactly(4).next(&buf, 0), Ok(4));
    assert_eq!(transfer_exactly(4).next(&buf, 1), Ok(3));
    assert_eq!(transfer_exactly(4).next(&buf, 4), Ok(0));
  }

  #[test]
  fn exactly_overshoot_is_misuse() {
    let buf = [0u8; 3];
    assert_eq!(
      transfer_exactly(4).next(&buf, 0),
      Err(ConfigError::ExactlyOvershoot.into())
    );
  }

  #[test]
  fn closures_are_conditions() {
    let mut calls = 0;
    let mut until_newline = |buf: &[u8], done: usize| -> Result<usize> {
      calls += 1;
      Ok(if buf[..done].contains(&b'\n') { 0 } else { 1 })
    };
    assert_eq!(until_newline.next(b"ab\ncd", 2), Ok(1));
    assert_eq!(until_newline.next(b"ab\ncd", 3), Ok(0));
    assert_eq!(calls, 2);
  }

  proptest! {
    #[test]
    fn at_least_beyond_buffer_is_transfer_all(
      len in 0usize..256,
      extra in 1usize..256,
      done_frac in 0.0f64..=1.0,
    ) {
      let buf = vec![0u8; len];
      let done = (len as f64 * done_frac) as usize;
      prop_assert_eq!(
        transfer_at_least(len + extra).next(&buf, done),
        transfer_all().next(&buf, done)
      );
    }

    #[test]
    fn exhausted_buffer_always_stops(len in 0usize..256, n in 0usize..256) {
      let buf = vec![0u8; len];
      prop_assert_eq!(transfer_all().next(&buf, len), Ok(0));
      prop_assert_eq!(transfer_at_least(n).next(&buf, len), Ok(0));
      if n <= len {
        prop_assert_eq!(transfer_exactly(n).next(&buf, n), Ok(0));
      }
    }

    #[test]
    fn requests_fit_remaining_region(len in 1usize..256, n in 0usize..256, done in 0usize..256) {
      let buf = vec![0u8; len];
      let done = done % (len + 1);
      let remaining = len - done;
      prop_assert!(transfer_all().next(&buf, done).unwrap() <= remaining);
      prop_assert!(transfer_at_least(n).next(&buf, done).unwrap() <= remaining);
      if n <= len && done <= n {
        prop_assert!(transfer_exactly(n).next(&buf, done).unwrap() <= n - done);
      }
    }
  }
}

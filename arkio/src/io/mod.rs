//! Callback-style reads and writes.
//!
//! The `_some` variants perform one partial transfer. [`async_read`] and
//! [`async_write`] keep transferring until their
//! [`CompletionCondition`] is satisfied, the buffer is exhausted, the peer
//! reaches end-of-file or an error occurs, and then invoke the callback
//! once with the total byte count and the buffer.
//!
//! A refused submission hands the buffer and the callback back.

mod transfer;

pub(crate) use transfer::{Reading, Transfer, Writing};

use crate::buf::{BufResult, IoBuf, IoBufMut};
use crate::callback::Callback;
use crate::completion::CompletionCondition;
use crate::error::{ConfigError, SubmitError};
use crate::fd::Descriptor;
use crate::op::{ReadSome, WriteSome};

/// A refused transfer: the buffer and the callback, untouched.
pub type Rejected<B> = SubmitError<(B, Callback<BufResult<usize, B>>)>;

/// Reads once into `buf`. `Ok(0)` means end-of-file.
pub fn async_read_some<D, B, F>(
  desc: &D,
  buf: B,
  callback: F,
) -> Result<(), Rejected<B>>
where
  D: Descriptor + ?Sized,
  B: IoBufMut,
  F: FnOnce(BufResult<usize, B>) + 'static,
{
  let callback = Callback::new(callback);
  let Some(handle) = desc.bound_context() else {
    return Err(SubmitError::new(ConfigError::Unbound, (buf, callback)));
  };
  handle
    .submit(desc, ReadSome::new(buf), callback)
    .map_err(|err| err.map(|(op, cb)| (op.into_inner(), cb)))
}

/// Writes `buf` once; the count may be short.
pub fn async_write_some<D, B, F>(
  desc: &D,
  buf: B,
  callback: F,
) -> Result<(), Rejected<B>>
where
  D: Descriptor + ?Sized,
  B: IoBuf,
  F: FnOnce(BufResult<usize, B>) + 'static,
{
  let callback = Callback::new(callback);
  let Some(handle) = desc.bound_context() else {
    return Err(SubmitError::new(ConfigError::Unbound, (buf, callback)));
  };
  handle
    .submit(desc, WriteSome::new(buf), callback)
    .map_err(|err| err.map(|(op, cb)| (op.into_inner(), cb)))
}

/// Reads into `buf` until `cond` is satisfied.
///
/// End-of-file before that is not an error: the callback gets the partial
/// count.
pub fn async_read<D, B, C, F>(
  desc: &D,
  buf: B,
  cond: C,
  callback: F,
) -> Result<(), Rejected<B>>
where
  D: Descriptor + ?Sized,
  B: IoBufMut,
  C: CompletionCondition + 'static,
  F: FnOnce(BufResult<usize, B>) + 'static,
{
  Transfer::<Reading<B>, C>::start(desc, buf, cond, Callback::new(callback))
}

/// Writes from `buf` until `cond` is satisfied.
pub fn async_write<D, B, C, F>(
  desc: &D,
  buf: B,
  cond: C,
  callback: F,
) -> Result<(), Rejected<B>>
where
  D: Descriptor + ?Sized,
  B: IoBuf,
  C: CompletionCondition + 'static,
  F: FnOnce(BufResult<usize, B>) + 'static,
{
  Transfer::<Writing<B>, C>::start(desc, buf, cond, Callback::new(callback))
}

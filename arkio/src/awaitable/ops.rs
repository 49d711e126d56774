use std::future::IntoFuture;
use std::net::SocketAddr;

use super::{Awaitable, Awaited};
use crate::buf::{BufResult, IoBuf, IoBufMut};
use crate::callback::Callback;
use crate::completion::CompletionCondition;
use crate::error::{ConfigError, Result};
use crate::fd::Descriptor;
use crate::io::{Reading, Transfer, Writing};
use crate::net::{TcpListener, TcpStream};
use crate::op::{Connect, Operation, ReadSome, WriteSome};

/// A single operation submitted on a descriptor.
pub struct OpAwaitable<'a, O> {
  desc: &'a dyn Descriptor,
  op: O,
}

impl<'a, O: Operation> OpAwaitable<'a, O> {
  pub fn new(desc: &'a dyn Descriptor, op: O) -> Self {
    Self { desc, op }
  }
}

impl<O: Operation> Awaitable for OpAwaitable<'_, O> {
  type Output = O::Output;

  fn invoke(self, callback: Callback<O::Output>) {
    let Some(handle) = self.desc.bound_context() else {
      return callback.call(self.op.complete(Err(ConfigError::Unbound.into())));
    };
    if let Err(rejected) = handle.submit(self.desc, self.op, callback) {
      let (err, (op, callback)) = rejected.into_parts();
      callback.call(op.complete(Err(err)));
    }
  }
}

/// [`read`] in progress.
pub struct ReadTransfer<'a, B, C> {
  desc: &'a dyn Descriptor,
  buf: B,
  cond: C,
}

impl<B, C> Awaitable for ReadTransfer<'_, B, C>
where
  B: IoBufMut,
  C: CompletionCondition + 'static,
{
  type Output = BufResult<usize, B>;

  fn invoke(self, callback: Callback<Self::Output>) {
    let started =
      Transfer::<Reading<B>, C>::start(self.desc, self.buf, self.cond, callback);
    if let Err(rejected) = started {
      let (err, (buf, callback)) = rejected.into_parts();
      callback.call((Err(err), buf));
    }
  }
}

/// [`write`] in progress.
pub struct WriteTransfer<'a, B, C> {
  desc: &'a dyn Descriptor,
  buf: B,
  cond: C,
}

impl<B, C> Awaitable for WriteTransfer<'_, B, C>
where
  B: IoBuf,
  C: CompletionCondition + 'static,
{
  type Output = BufResult<usize, B>;

  fn invoke(self, callback: Callback<Self::Output>) {
    let started =
      Transfer::<Writing<B>, C>::start(self.desc, self.buf, self.cond, callback);
    if let Err(rejected) = started {
      let (err, (buf, callback)) = rejected.into_parts();
      callback.call((Err(err), buf));
    }
  }
}

/// An accept whose socket is bound to the listener's context.
pub struct Accepting<'a> {
  listener: &'a TcpListener,
}

impl Awaitable for Accepting<'_> {
  type Output = Result<(TcpStream, SocketAddr)>;

  fn invoke(self, callback: Callback<Self::Output>) {
    if let Err(err) = self.listener.async_accept(move |res| callback.call(res)) {
      let (err, callback) = err.into_parts();
      callback.call(Err(err));
    }
  }
}

/// See [`Awaitable::map`].
pub struct Map<A, F> {
  inner: A,
  f: F,
}

impl<A, F> Map<A, F> {
  pub(super) fn new(inner: A, f: F) -> Self {
    Self { inner, f }
  }
}

impl<A, F, U> Awaitable for Map<A, F>
where
  A: Awaitable,
  F: FnOnce(A::Output) -> U + 'static,
  U: 'static,
{
  type Output = U;

  fn invoke(self, callback: Callback<U>) {
    self.inner.invoke(callback.map(self.f))
  }
}

macro_rules! into_future {
  ($($ty:ty => [$($generics:tt)*] where [$($bounds:tt)*];)*) => {$(
    impl<$($generics)*> IntoFuture for $ty
    where
      $($bounds)*
    {
      type Output = <$ty as Awaitable>::Output;
      type IntoFuture = Awaited<$ty>;

      fn into_future(self) -> Self::IntoFuture {
        Awaited::new(self)
      }
    }
  )*};
}

into_future! {
  OpAwaitable<'a, O> => ['a, O] where [O: Operation];
  ReadTransfer<'a, B, C> => ['a, B, C] where [B: IoBufMut, C: CompletionCondition + 'static];
  WriteTransfer<'a, B, C> => ['a, B, C] where [B: IoBuf, C: CompletionCondition + 'static];
  Accepting<'a> => ['a] where [];
  Map<A, F> => [A, F, U] where [A: Awaitable, F: FnOnce(A::Output) -> U + 'static, U: 'static];
}

/// Reads once into `buf`.
pub fn read_some<D, B>(desc: &D, buf: B) -> OpAwaitable<'_, ReadSome<B>>
where
  D: Descriptor,
  B: IoBufMut,
{
  OpAwaitable::new(desc, ReadSome::new(buf))
}

/// Writes `buf` once.
pub fn write_some<D, B>(desc: &D, buf: B) -> OpAwaitable<'_, WriteSome<B>>
where
  D: Descriptor,
  B: IoBuf,
{
  OpAwaitable::new(desc, WriteSome::new(buf))
}

/// Awaitable form of [`crate::io::async_read`].
pub fn read<D, B, C>(desc: &D, buf: B, cond: C) -> ReadTransfer<'_, B, C>
where
  D: Descriptor,
  B: IoBufMut,
  C: CompletionCondition + 'static,
{
  ReadTransfer { desc, buf, cond }
}

/// Awaitable form of [`crate::io::async_write`].
pub fn write<D, B, C>(desc: &D, buf: B, cond: C) -> WriteTransfer<'_, B, C>
where
  D: Descriptor,
  B: IoBuf,
  C: CompletionCondition + 'static,
{
  WriteTransfer { desc, buf, cond }
}

pub fn connect(stream: &TcpStream, addr: SocketAddr) -> OpAwaitable<'_, Connect> {
  OpAwaitable::new(stream, Connect::new(addr))
}

pub fn accept_with_addr(listener: &TcpListener) -> Accepting<'_> {
  Accepting { listener }
}

type DropPeer = fn(Result<(TcpStream, SocketAddr)>) -> Result<TcpStream>;

/// Accepts a connection, dropping the peer address.
pub fn accept(listener: &TcpListener) -> Map<Accepting<'_>, DropPeer> {
  let drop_peer: DropPeer = |res| res.map(|(stream, _)| stream);
  accept_with_addr(listener).map(drop_peer)
}

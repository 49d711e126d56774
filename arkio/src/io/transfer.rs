use std::marker::PhantomData;
use std::os::fd::RawFd;

use tracing::trace;

use super::Rejected;
use crate::buf::{BufResult, IoBuf, IoBufMut};
use crate::callback::Callback;
use crate::completion::CompletionCondition;
use crate::context::Handle;
use crate::error::{ConfigError, Result, SubmitError};
use crate::fd::Descriptor;
use crate::op::{Intent, Operation, ReadSome, WriteSome};

/// Which partial operation a transfer repeats.
pub(crate) trait Direction: 'static {
  type Buf: IoBuf;
  type Op: Operation<Output = BufResult<usize, Self::Buf>>;

  const INTENT: Intent;

  fn op(buf: Self::Buf, start: usize, len: usize) -> Self::Op;
}

pub(crate) struct Reading<B>(PhantomData<B>);

pub(crate) struct Writing<B>(PhantomData<B>);

impl<B: IoBufMut> Direction for Reading<B> {
  type Buf = B;
  type Op = ReadSome<B>;

  const INTENT: Intent = Intent::Read;

  fn op(buf: B, start: usize, len: usize) -> Self::Op {
    ReadSome::window(buf, start, len)
  }
}

impl<B: IoBuf> Direction for Writing<B> {
  type Buf = B;
  type Op = WriteSome<B>;

  const INTENT: Intent = Intent::Write;

  fn op(buf: B, start: usize, len: usize) -> Self::Op {
    WriteSome::window(buf, start, len)
  }
}

/// State of one composite read or write between partial completions.
///
/// Each partial operation's callback owns the transfer and either finishes
/// it or submits the next partial operation, so exactly one of them is in
/// flight at a time.
pub(crate) struct Transfer<D: Direction, C> {
  handle: Handle,
  fd: RawFd,
  cond: C,
  done: usize,
  callback: Callback<BufResult<usize, D::Buf>>,
  _dir: PhantomData<fn() -> D>,
}

impl<D, C> Transfer<D, C>
where
  D: Direction,
  C: CompletionCondition + 'static,
{
  pub fn start<T>(
    desc: &T,
    buf: D::Buf,
    cond: C,
    callback: Callback<BufResult<usize, D::Buf>>,
  ) -> std::result::Result<(), Rejected<D::Buf>>
  where
    T: Descriptor + ?Sized,
  {
    let Some(handle) = desc.bound_context() else {
      return Err(SubmitError::new(ConfigError::Unbound, (buf, callback)));
    };
    let fd = desc.raw_fd();
    if let Err(err) = handle.check_submit(fd, D::INTENT) {
      return Err(SubmitError::new(err, (buf, callback)));
    }

    let mut transfer = Self {
      handle: handle.clone(),
      fd,
      cond,
      done: 0,
      callback,
      _dir: PhantomData,
    };
    match transfer.cond.next(buf.buf(), 0) {
      Ok(want) if want > 0 && buf.buf_len() > 0 => {
        transfer.submit(buf, want);
        Ok(())
      }
      // Finished before anything moved. The callback still runs from the
      // loop, never from inside this call.
      outcome => {
        let res = outcome.map(|_| 0);
        let handle = transfer.handle.clone();
        handle
          .defer((transfer, res, buf), |(transfer, res, buf)| {
            transfer.deliver(res, buf)
          })
          .map_err(|err| {
            err.map(|(transfer, _, buf)| (buf, transfer.callback))
          })
      }
    }
  }

  fn submit(self, buf: D::Buf, want: usize) {
    let len = want.min(buf.buf_len() - self.done);
    let op = D::op(buf, self.done, len);
    let handle = self.handle.clone();
    let fd = self.fd;

    let next = Callback::new(move |out| self.on_partial(out));
    if let Err(rejected) = handle.submit_fd(fd, op, next) {
      let (err, (op, next)) = rejected.into_parts();
      next.call(op.complete(Err(err)));
    }
  }

  fn on_partial(mut self, (res, buf): BufResult<usize, D::Buf>) {
    let n = match res {
      Ok(n) => n,
      Err(err) => return self.deliver(Err(err), buf),
    };
    if n == 0 {
      let done = self.done;
      return self.deliver(Ok(done), buf);
    }

    self.done += n;
    match self.cond.next(buf.buf(), self.done) {
      Err(err) => self.deliver(Err(err), buf),
      Ok(want) if want > 0 && self.done < buf.buf_len() => self.submit(buf, want),
      Ok(_) => {
        let done = self.done;
        self.deliver(Ok(done), buf)
      }
    }
  }

  fn deliver(self, res: Result<usize>, buf: D::Buf) {
    trace!(fd = self.fd, intent = ?D::INTENT, ?res, "transfer finished");
    self.callback.call((res, buf));
  }
}

//! Consuming callback-style operations from `async` code.
//!
//! Every operation that takes a [`Callback`] can be wrapped in an
//! [`Awaitable`]. Awaiting it submits the operation on first poll and
//! resumes the future with whatever the callback receives:
//!
//! ```no_run
//! use arkio::{IoContext, awaitable, completion::transfer_all, fd::pipe};
//!
//! let ctx = IoContext::new()?;
//! let (reader, writer) = pipe(Some(&ctx.handle()))?;
//!
//! let (res, buf) = ctx.block_on(async move {
//!   let (res, _) = awaitable::write_some(&writer, b"ping").await;
//!   res?;
//!   Ok::<_, arkio::ErrorCode>(awaitable::read(&reader, vec![0u8; 4], transfer_all()).await)
//! })??;
//! assert_eq!(res?, 4);
//! assert_eq!(buf, b"ping");
//! # Ok::<(), arkio::ErrorCode>(())
//! ```
//!
//! The callback writes into a shared completion slot rather than into the
//! future, so dropping a future whose operation is still pending is fine:
//! the operation completes (or is cancelled) on its own and the value is
//! discarded.

mod ops;

pub use ops::{
  Accepting, Map, OpAwaitable, ReadTransfer, WriteTransfer, accept,
  accept_with_addr, connect, read, read_some, write, write_some,
};

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::callback::Callback;

/// An operation that reports its outcome through a [`Callback`].
pub trait Awaitable: Sized {
  type Output: 'static;

  /// Starts the operation. `callback` runs exactly once, possibly before
  /// `invoke` returns when the operation is refused.
  fn invoke(self, callback: Callback<Self::Output>);

  /// The future that drives this operation.
  fn awaited(self) -> Awaited<Self> {
    Awaited::new(self)
  }

  /// Transforms the delivered value.
  fn map<U, F>(self, f: F) -> Map<Self, F>
  where
    F: FnOnce(Self::Output) -> U + 'static,
    U: 'static,
  {
    Map::new(self, f)
  }
}

/// Future returned by [`Awaitable::awaited`] and by `.await` on the
/// awaitables of this crate.
pub struct Awaited<A: Awaitable> {
  status: Status<A>,
}

enum Status<A: Awaitable> {
  NeverPolled(A),
  Waiting(Rc<Slot<A::Output>>),
  Done,
}

struct Slot<T> {
  value: RefCell<Option<T>>,
  waker: RefCell<Option<Waker>>,
}

impl<T> Slot<T> {
  fn new(waker: &Waker) -> Self {
    Self { value: RefCell::new(None), waker: RefCell::new(Some(waker.clone())) }
  }

  fn complete(&self, value: T) {
    *self.value.borrow_mut() = Some(value);
    let waker = self.waker.borrow_mut().take();
    if let Some(waker) = waker {
      waker.wake();
    }
  }

  fn take(&self) -> Option<T> {
    self.value.borrow_mut().take()
  }

  fn register(&self, waker: &Waker) {
    let mut slot = self.waker.borrow_mut();
    if !slot.as_ref().is_some_and(|w| w.will_wake(waker)) {
      *slot = Some(waker.clone());
    }
  }
}

impl<A: Awaitable> Awaited<A> {
  pub fn new(op: A) -> Self {
    Self { status: Status::NeverPolled(op) }
  }
}

// The operation is never pinned; it is moved out on first poll.
impl<A: Awaitable> Unpin for Awaited<A> {}

impl<A: Awaitable> Future for Awaited<A> {
  type Output = A::Output;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match std::mem::replace(&mut this.status, Status::Done) {
      Status::NeverPolled(op) => {
        let slot = Rc::new(Slot::new(cx.waker()));
        let sink = slot.clone();
        op.invoke(Callback::new(move |value| sink.complete(value)));

        // Refusals are delivered before `invoke` returns.
        match slot.take() {
          Some(value) => Poll::Ready(value),
          None => {
            this.status = Status::Waiting(slot);
            Poll::Pending
          }
        }
      }
      Status::Waiting(slot) => match slot.take() {
        Some(value) => Poll::Ready(value),
        None => {
          slot.register(cx.waker());
          this.status = Status::Waiting(slot);
          Poll::Pending
        }
      },
      Status::Done => panic!("`Awaited` polled after completion"),
    }
  }
}

//! Futures driven by the context.
//!
//! Tasks live in the context's task table. A task is polled when its waker
//! fires; wakers go through the same channel as [`Remote`](super::Remote)
//! messages, so they may be used from any thread.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crossbeam_channel::Sender;
use tracing::trace;

use super::{Handle, Inner, IoContext, Key, Message, Ready, RunMode};
use crate::error::{ErrorCode, Result};
use crate::sys::{OsPoller, ReadinessPoll};

pub(crate) type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

struct TaskWaker {
  key: Key,
  tx: Sender<Message>,
  poller: Arc<OsPoller>,
}

impl Wake for TaskWaker {
  fn wake(self: Arc<Self>) {
    self.wake_by_ref();
  }

  fn wake_by_ref(self: &Arc<Self>) {
    if self.tx.send(Message::Wake(self.key)).is_ok() {
      // The loop drains the channel before it waits, so a failed wakeup
      // only delays the task until the next event.
      let _ = self.poller.notify();
    }
  }
}

impl Inner {
  pub(super) fn spawn_local(&self, fut: LocalFuture) -> Result<()> {
    let mut st = self.state.borrow_mut();
    if !st.phase.accepts_work() {
      drop(st);
      drop(fut);
      return Err(ErrorCode::CANCELLED);
    }
    let key = st.tasks.insert(Some(fut));
    st.ready.push_back(Ready::Task(key));
    trace!(task = key.as_u64(), "spawned");
    Ok(())
  }

  pub(super) fn poll_task(&self, key: Key) {
    // A task that finished, or is being polled further up the stack, has no
    // future to take.
    let fut = self.state.borrow_mut().tasks.get_mut(key).and_then(Option::take);
    let Some(mut fut) = fut else { return };

    let waker = Waker::from(Arc::new(TaskWaker {
      key,
      tx: self.tx.clone(),
      poller: self.poller.clone(),
    }));
    let mut cx = Context::from_waker(&waker);

    match fut.as_mut().poll(&mut cx) {
      Poll::Ready(()) => {
        self.state.borrow_mut().tasks.remove(key);
        trace!(task = key.as_u64(), "finished");
      }
      Poll::Pending => {
        if let Some(slot) = self.state.borrow_mut().tasks.get_mut(key) {
          *slot = Some(fut);
        }
      }
    }
  }
}

impl Handle {
  /// Spawns `fut` on the context. It starts running on the next dispatch.
  ///
  /// The task keeps [`IoContext::run`] going until it finishes. A stop drops
  /// it if it is still suspended once the cancelled operations are
  /// delivered.
  pub fn spawn<F>(&self, fut: F) -> Result<()>
  where
    F: Future<Output = ()> + 'static,
  {
    self.upgrade()?.spawn_local(Box::pin(fut))
  }
}

impl IoContext {
  /// Runs the context until `fut` completes and returns its output.
  ///
  /// Other work stays pending once `fut` is done. If the context stops
  /// first, the result is [`ErrorCode::CANCELLED`].
  pub fn block_on<F>(&self, fut: F) -> Result<F::Output>
  where
    F: Future + 'static,
    F::Output: 'static,
  {
    let out = Rc::new(RefCell::new(None));
    let slot = out.clone();
    self.inner.spawn_local(Box::pin(async move {
      let value = fut.await;
      *slot.borrow_mut() = Some(value);
    }))?;

    let done = || out.borrow().is_some();
    self.inner.run(RunMode::Until(&done))?;
    out.borrow_mut().take().ok_or(ErrorCode::CANCELLED)
  }
}

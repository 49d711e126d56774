use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::{ContextId, Message};
use crate::error::{ErrorCode, Result};
use crate::sys::{OsPoller, ReadinessPoll};

/// Thread-safe way to reach a context from other threads.
///
/// Messages are queued and the poller is woken, so a blocked
/// [`IoContext::run`](super::IoContext::run) picks them up right away.
#[derive(Clone)]
pub struct Remote {
  id: ContextId,
  tx: Sender<Message>,
  poller: Arc<OsPoller>,
}

impl Remote {
  pub(super) fn new(id: ContextId, tx: Sender<Message>, poller: Arc<OsPoller>) -> Self {
    Self { id, tx, poller }
  }

  pub fn id(&self) -> ContextId {
    self.id
  }

  /// Requests a stop, like [`IoContext::stop`](super::IoContext::stop).
  pub fn stop(&self) -> Result<()> {
    self.send(Message::Stop)
  }

  /// Runs `f` on the loop thread. Fails with [`ErrorCode::CANCELLED`] once
  /// the context is gone.
  pub fn post<F>(&self, f: F) -> Result<()>
  where
    F: FnOnce() + Send + 'static,
  {
    self.send(Message::Post(Box::new(f)))
  }

  pub(super) fn send(&self, message: Message) -> Result<()> {
    self.tx.send(message).map_err(|_| ErrorCode::CANCELLED)?;
    self.poller.notify()?;
    Ok(())
  }
}

impl fmt::Debug for Remote {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Remote").field("id", &self.id).finish()
  }
}

#[cfg(test)]
mod tests {
  use crate::IoContext;
  use crate::fd::pipe;
  use crate::op::ReadSome;
  use crate::{Callback, ErrorCode};
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::{Arc, mpsc};
  use std::thread;
  use std::time::Duration;

  #[test]
  fn stop_from_another_thread_wakes_run() {
    let ctx = IoContext::new().unwrap();
    let (r, _w) = pipe(Some(&ctx.handle())).unwrap();
    let (tx, rx) = mpsc::channel();
    ctx
      .handle()
      .submit(
        &r,
        ReadSome::new(vec![0u8; 1]),
        Callback::new(move |(res, _)| tx.send(res).unwrap()),
      )
      .unwrap();

    let remote = ctx.remote();
    let stopper = thread::spawn(move || {
      thread::sleep(Duration::from_millis(20));
      remote.stop().unwrap();
    });
    ctx.run().unwrap();
    stopper.join().unwrap();

    assert_eq!(rx.recv().unwrap(), Err(ErrorCode::CANCELLED));
  }

  #[test]
  fn post_runs_on_loop_thread() {
    let ctx = IoContext::new().unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let loop_thread = thread::current().id();
    let (tx, rx) = mpsc::channel();

    let remote = ctx.remote();
    let flag = ran.clone();
    thread::spawn(move || {
      remote
        .post(move || {
          flag.store(true, Ordering::SeqCst);
          tx.send(thread::current().id()).unwrap();
        })
        .unwrap();
    })
    .join()
    .unwrap();

    ctx.run().unwrap();
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(rx.recv().unwrap(), loop_thread);
  }

  #[test]
  fn post_after_drop_is_cancelled() {
    let remote = IoContext::new().unwrap().remote();
    assert_eq!(remote.post(|| {}), Err(ErrorCode::CANCELLED));
  }
}

//! Operations the context can drive to completion.
//!
//! An [`Operation`] is a single non-blocking syscall plus the state it
//! needs. The context calls [`Operation::attempt`] whenever the descriptor
//! is ready for the operation's [`Intent`] until it stops reporting
//! would-block, then converts the outcome with [`Operation::complete`] and
//! hands it to the callback.

mod accept;
mod connect;
mod read;
mod write;

pub use accept::Accept;
pub use connect::Connect;
pub use read::ReadSome;
pub use write::WriteSome;

pub(crate) use write::write_bytes;

use std::io;
use std::os::fd::RawFd;

use crate::callback::Callback;
use crate::error::{ErrorCode, Result};
use crate::sys::Interest;

/// What an operation waits for.
///
/// A descriptor holds at most one pending operation per intent. `Read` and
/// `Accept` wait for readability, `Write` and `Connect` for writability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
  Read,
  Write,
  Connect,
  Accept,
}

impl Intent {
  pub(crate) const ALL: [Intent; 4] =
    [Intent::Read, Intent::Write, Intent::Connect, Intent::Accept];

  pub(crate) const fn index(self) -> usize {
    match self {
      Intent::Read => 0,
      Intent::Write => 1,
      Intent::Connect => 2,
      Intent::Accept => 3,
    }
  }

  pub(crate) const fn interest(self) -> Interest {
    match self {
      Intent::Read | Intent::Accept => Interest::READ,
      Intent::Write | Intent::Connect => Interest::WRITE,
    }
  }
}

pub trait Operation: 'static {
  type Output: 'static;

  const INTENT: Intent;

  /// Try the syscall once at submission instead of waiting for readiness
  /// first. Needed by operations whose readiness only means something after
  /// the call was started, like `connect`.
  const EAGER: bool = false;

  /// Runs the syscall once.
  ///
  /// `WouldBlock` (and `EINPROGRESS`) keep the operation pending; `EINTR`
  /// is retried immediately; anything else is terminal. Must not call back
  /// into the context.
  fn attempt(&mut self, fd: RawFd) -> io::Result<usize>;

  /// Builds the callback argument from the terminal outcome.
  fn complete(self, res: Result<usize>) -> Self::Output;
}

/// Type erased pending operation owned by the context.
pub(crate) trait Pending {
  fn intent(&self) -> Intent;

  /// Returns `true` once a terminal outcome is recorded.
  fn attempt(&mut self, fd: RawFd) -> bool;

  /// Records `err` as the outcome.
  fn fail(&mut self, err: ErrorCode);

  /// Invokes the callback. Must run with no context state borrowed.
  fn finish(self: Box<Self>);
}

pub(crate) struct PendingOp<O: Operation> {
  op: O,
  callback: Callback<O::Output>,
  outcome: Option<Result<usize>>,
}

impl<O: Operation> PendingOp<O> {
  pub fn new(op: O, callback: Callback<O::Output>) -> Self {
    Self { op, callback, outcome: None }
  }
}

impl<O: Operation> Pending for PendingOp<O> {
  fn intent(&self) -> Intent {
    O::INTENT
  }

  fn attempt(&mut self, fd: RawFd) -> bool {
    debug_assert!(self.outcome.is_none(), "attempt after outcome");
    loop {
      match self.op.attempt(fd) {
        Ok(n) => {
          self.outcome = Some(Ok(n));
          return true;
        }
        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
        Err(err) if would_block(&err) => return false,
        Err(err) => {
          self.outcome = Some(Err(err.into()));
          return true;
        }
      }
    }
  }

  fn fail(&mut self, err: ErrorCode) {
    self.outcome = Some(Err(err));
  }

  fn finish(self: Box<Self>) {
    let PendingOp { op, callback, outcome } = *self;
    let res = outcome.unwrap_or(Err(ErrorCode::CANCELLED));
    callback.call(op.complete(res));
  }
}

pub(crate) fn would_block(err: &io::Error) -> bool {
  err.kind() == io::ErrorKind::WouldBlock
    || matches!(err.raw_os_error(), Some(libc::EINPROGRESS | libc::EALREADY))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{cell::RefCell, rc::Rc};

  struct Scripted(Vec<io::Result<usize>>);

  impl Operation for Scripted {
    type Output = Result<usize>;
    const INTENT: Intent = Intent::Read;

    fn attempt(&mut self, _fd: RawFd) -> io::Result<usize> {
      self.0.remove(0)
    }

    fn complete(self, res: Result<usize>) -> Self::Output {
      res
    }
  }

  fn pending(
    script: Vec<io::Result<usize>>,
  ) -> (Box<dyn Pending>, Rc<RefCell<Option<Result<usize>>>>) {
    let seen = Rc::new(RefCell::new(None));
    let cb = Callback::new({
      let seen = seen.clone();
      move |res| *seen.borrow_mut() = Some(res)
    });
    (Box::new(PendingOp::new(Scripted(script), cb)), seen)
  }

  #[test]
  fn would_block_keeps_pending() {
    let (mut op, seen) = pending(vec![
      Err(io::ErrorKind::WouldBlock.into()),
      Err(io::Error::from_raw_os_error(libc::EINTR)),
      Ok(3),
    ]);
    assert!(!op.attempt(0));
    assert!(op.attempt(0));
    op.finish();
    assert_eq!(*seen.borrow(), Some(Ok(3)));
  }

  #[test]
  fn hard_errors_are_terminal() {
    let (mut op, seen) =
      pending(vec![Err(io::Error::from_raw_os_error(libc::ECONNRESET))]);
    assert!(op.attempt(0));
    op.finish();
    assert_eq!(*seen.borrow(), Some(Err(ErrorCode::CONNECTION_RESET)));
  }

  #[test]
  fn finish_without_outcome_is_cancellation() {
    let (op, seen) = pending(vec![]);
    op.finish();
    assert_eq!(*seen.borrow(), Some(Err(ErrorCode::CANCELLED)));
  }

  #[test]
  fn intents_split_by_direction() {
    assert!(Intent::Accept.interest().is_readable());
    assert!(Intent::Connect.interest().is_writable());
    let indices: Vec<_> = Intent::ALL.iter().map(|i| i.index()).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
  }
}

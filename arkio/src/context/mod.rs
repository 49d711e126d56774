//! The event loop.
//!
//! An [`IoContext`] owns the OS poller, every pending operation and the
//! tasks spawned on it. It is driven by [`IoContext::run`] on the thread
//! that created it. Code running inside callbacks reaches the context
//! through a [`Handle`], other threads through a [`Remote`].
//!
//! ```no_run
//! use arkio::{IoContext, completion::transfer_all, fd::pipe, io};
//!
//! let ctx = IoContext::new()?;
//! let (reader, _writer) = pipe(Some(&ctx.handle()))?;
//!
//! io::async_read(&reader, vec![0u8; 16], transfer_all(), |(res, buf)| {
//!   println!("{:?}: {:?}", res, &buf[..]);
//! })
//! .map_err(|err| err.error())?;
//!
//! ctx.run()?;
//! # Ok::<(), arkio::ErrorCode>(())
//! ```

mod builder;
mod remote;
mod store;
mod task;

pub use builder::Builder;
pub use remote::Remote;

pub(crate) use store::{Key, Store};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::callback::Callback;
use crate::error::{ConfigError, ErrorCode, Result, SubmitError};
use crate::fd::Descriptor;
use crate::op::{Intent, Operation, Pending, PendingOp};
use crate::sys::{Events, Interest, NOTIFY_KEY, OsPoller, ReadinessPoll};

use task::LocalFuture;

/// Identity of a context, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
  fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
  Idle,
  Running,
  Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Idle,
  Running,
  Stopped,
  /// The owning [`IoContext`] is being dropped.
  ShuttingDown,
}

impl Phase {
  fn accepts_work(self) -> bool {
    matches!(self, Phase::Idle | Phase::Running)
  }
}

/// Sent to the loop from [`Remote`]s and task wakers.
pub(crate) enum Message {
  Stop,
  Post(Box<dyn FnOnce() + Send>),
  Wake(Key),
}

enum Ready {
  Op(Box<dyn Pending>),
  Post(Box<dyn FnOnce()>),
  Task(Key),
}

/// Pending operations of one descriptor, one slot per [`Intent`].
#[derive(Default)]
struct Registration {
  slots: [Option<Key>; 4],
}

impl Registration {
  fn interest(&self) -> Interest {
    Intent::ALL
      .into_iter()
      .filter(|intent| self.slots[intent.index()].is_some())
      .fold(Interest::NONE, |acc, intent| acc | intent.interest())
  }
}

struct State {
  phase: Phase,
  ops: Store<Box<dyn Pending>>,
  fds: HashMap<RawFd, Registration>,
  ready: VecDeque<Ready>,
  tasks: Store<Option<LocalFuture>>,
}

pub(crate) struct Inner {
  id: ContextId,
  poller: Arc<OsPoller>,
  events: RefCell<Events>,
  state: RefCell<State>,
  stop_requested: Cell<bool>,
  tx: Sender<Message>,
  rx: Receiver<Message>,
}

#[derive(Clone, Copy)]
enum RunMode<'a> {
  /// Until out of work.
  Drain,
  /// One non-blocking round.
  Poll,
  /// Until out of work or the predicate holds.
  Until(&'a dyn Fn() -> bool),
}

/// Owner of an event loop.
///
/// Dropping the context cancels every pending operation: each callback runs
/// once more with [`ErrorCode::CANCELLED`].
pub struct IoContext {
  inner: Rc<Inner>,
}

impl IoContext {
  /// Sets up a context with default settings.
  ///
  /// Fails with the OS error if the poller cannot be created.
  pub fn new() -> Result<Self> {
    Builder::new().build()
  }

  pub fn builder() -> Builder {
    Builder::new()
  }

  fn with_config(config: &Builder) -> Result<Self> {
    let poller = Arc::new(OsPoller::new()?);
    let (tx, rx) = crossbeam_channel::unbounded();
    let id = ContextId::next();
    let inner = Inner {
      id,
      poller,
      events: RefCell::new(Events::with_capacity(config.event_capacity)),
      state: RefCell::new(State {
        phase: Phase::Idle,
        ops: Store::with_capacity(config.op_capacity),
        fds: HashMap::with_capacity(config.op_capacity),
        ready: VecDeque::new(),
        tasks: Store::with_capacity(0),
      }),
      stop_requested: Cell::new(false),
      tx,
      rx,
    };
    debug!(?id, event_capacity = config.event_capacity, "context created");
    Ok(Self { inner: Rc::new(inner) })
  }

  pub fn id(&self) -> ContextId {
    self.inner.id
  }

  pub fn handle(&self) -> Handle {
    Handle { inner: Rc::downgrade(&self.inner), id: self.inner.id }
  }

  pub fn remote(&self) -> Remote {
    Remote::new(self.inner.id, self.inner.tx.clone(), self.inner.poller.clone())
  }

  pub fn state(&self) -> ContextState {
    match self.inner.state.borrow().phase {
      Phase::Idle => ContextState::Idle,
      Phase::Running => ContextState::Running,
      Phase::Stopped | Phase::ShuttingDown => ContextState::Stopped,
    }
  }

  /// Operations submitted and not yet completed.
  pub fn pending_operations(&self) -> usize {
    self.inner.state.borrow().ops.len()
  }

  /// Runs the loop until no operation, queued completion or live task is
  /// left, or until a stop request was processed. A task parked on a waker
  /// keeps the loop asleep on the poller until the waker fires.
  ///
  /// Returns [`ConfigError::Reentrant`] when called from one of this
  /// context's own callbacks, and the OS error if waiting on the poller
  /// fails. On a stopped context it returns immediately.
  pub fn run(&self) -> Result<()> {
    self.inner.run(RunMode::Drain).map(|_| ())
  }

  /// Dispatches whatever is ready without blocking. Returns how many
  /// callbacks and tasks ran.
  pub fn poll(&self) -> Result<usize> {
    self.inner.run(RunMode::Poll)
  }

  /// Requests a stop. The running loop (or the next call to
  /// [`run`](Self::run)) cancels all pending operations and returns.
  pub fn stop(&self) {
    self.inner.stop_requested.set(true);
  }

  /// Leaves the stopped state so the context can run again.
  pub fn restart(&self) {
    let mut st = self.inner.state.borrow_mut();
    if st.phase == Phase::Stopped {
      st.phase = Phase::Idle;
      self.inner.stop_requested.set(false);
      debug!(id = ?self.inner.id, "context restarted");
    }
  }
}

impl fmt::Debug for IoContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IoContext")
      .field("id", &self.inner.id)
      .field("state", &self.state())
      .field("pending", &self.pending_operations())
      .finish()
  }
}

impl Drop for IoContext {
  fn drop(&mut self) {
    debug!(id = ?self.inner.id, "context dropped");
    self.inner.state.borrow_mut().phase = Phase::ShuttingDown;
    self.inner.cancel_all();
    self.inner.flush();

    let (tasks, leftovers) = {
      let mut st = self.inner.state.borrow_mut();
      (st.tasks.drain(), std::mem::take(&mut st.ready))
    };
    drop(tasks);
    drop(leftovers);
  }
}

/// Non-owning reference to an [`IoContext`].
///
/// Handles are what descriptors and callbacks keep. Once the context is
/// gone every submission through a handle fails with
/// [`ErrorCode::CANCELLED`].
#[derive(Clone)]
pub struct Handle {
  inner: Weak<Inner>,
  id: ContextId,
}

impl Handle {
  pub fn id(&self) -> ContextId {
    self.id
  }

  /// Whether the context still exists.
  pub fn is_alive(&self) -> bool {
    self.inner.strong_count() > 0
  }

  fn upgrade(&self) -> Result<Rc<Inner>> {
    self.inner.upgrade().ok_or(ErrorCode::CANCELLED)
  }

  /// Submits `op` on `desc`; `callback` receives its output exactly once.
  ///
  /// Refused before any OS interaction when `desc` is not bound to this
  /// context, when `desc` already has a pending operation with the same
  /// intent, or when the context is stopped or gone. The operation and the
  /// callback come back inside the error.
  pub fn submit<D, O>(
    &self,
    desc: &D,
    op: O,
    callback: Callback<O::Output>,
  ) -> std::result::Result<(), SubmitError<(O, Callback<O::Output>)>>
  where
    D: Descriptor + ?Sized,
    O: Operation,
  {
    if let Err(err) = self.check_bound(desc) {
      return Err(SubmitError::new(err, (op, callback)));
    }
    self.submit_fd(desc.raw_fd(), op, callback)
  }

  pub(crate) fn check_bound<D>(&self, desc: &D) -> Result<()>
  where
    D: Descriptor + ?Sized,
  {
    match desc.bound_context() {
      None => Err(ConfigError::Unbound.into()),
      Some(handle) if handle.id != self.id => {
        Err(ConfigError::ContextMismatch.into())
      }
      Some(_) => Ok(()),
    }
  }

  pub(crate) fn submit_fd<O: Operation>(
    &self,
    fd: RawFd,
    op: O,
    callback: Callback<O::Output>,
  ) -> std::result::Result<(), SubmitError<(O, Callback<O::Output>)>> {
    match self.upgrade() {
      Ok(inner) => inner.submit(fd, op, callback),
      Err(err) => Err(SubmitError::new(err, (op, callback))),
    }
  }

  /// Checks what [`submit`](Self::submit) would check, without submitting.
  pub(crate) fn check_submit(&self, fd: RawFd, intent: Intent) -> Result<()> {
    self.upgrade()?.check_submit(fd, intent)
  }

  /// Queues `f` to run on the loop thread after the current dispatch.
  pub fn post<F>(&self, f: F) -> Result<()>
  where
    F: FnOnce() + 'static,
  {
    self.defer(f, |f| f()).map_err(|err| err.error())
  }

  /// Queues `f(value)`. A refused `value` is handed back.
  pub(crate) fn defer<T: 'static>(
    &self,
    value: T,
    f: fn(T),
  ) -> std::result::Result<(), SubmitError<T>> {
    let inner = match self.upgrade() {
      Ok(inner) => inner,
      Err(err) => return Err(SubmitError::new(err, value)),
    };
    let mut st = inner.state.borrow_mut();
    if !st.phase.accepts_work() {
      drop(st);
      return Err(SubmitError::new(ErrorCode::CANCELLED, value));
    }
    st.ready.push_back(Ready::Post(Box::new(move || f(value))));
    Ok(())
  }

  /// Asks the loop to stop. See [`IoContext::stop`].
  pub fn stop(&self) {
    if let Some(inner) = self.inner.upgrade() {
      inner.stop_requested.set(true);
    }
  }

  /// Cancels every pending operation on `desc`. Their callbacks receive
  /// [`ErrorCode::CANCELLED`] on the next dispatch. Returns how many were
  /// cancelled.
  pub fn cancel<D>(&self, desc: &D) -> Result<usize>
  where
    D: Descriptor + ?Sized,
  {
    self.check_bound(desc)?;
    Ok(self.cancel_fd(desc.raw_fd()))
  }

  /// Deregisters `fd` and cancels its operations. Called before a bound
  /// descriptor is closed.
  pub(crate) fn cancel_fd(&self, fd: RawFd) -> usize {
    match self.inner.upgrade() {
      Some(inner) => {
        let mut st = inner.state.borrow_mut();
        inner.fail_fd(&mut st, fd, ErrorCode::CANCELLED)
      }
      None => 0,
    }
  }
}

impl PartialEq for Handle {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for Handle {}

impl fmt::Debug for Handle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handle")
      .field("id", &self.id)
      .field("alive", &self.is_alive())
      .finish()
  }
}

/// Puts a running context back to idle when `run` returns or unwinds.
struct RunGuard<'a>(&'a Inner);

impl Drop for RunGuard<'_> {
  fn drop(&mut self) {
    let mut st = self.0.state.borrow_mut();
    if st.phase == Phase::Running {
      st.phase = Phase::Idle;
    }
  }
}

impl Inner {
  fn run(self: &Rc<Self>, mode: RunMode<'_>) -> Result<usize> {
    {
      let mut st = self.state.borrow_mut();
      match st.phase {
        Phase::Running => return Err(ConfigError::Reentrant.into()),
        Phase::Stopped | Phase::ShuttingDown => return Ok(0),
        Phase::Idle => st.phase = Phase::Running,
      }
    }
    let _guard = RunGuard(self);
    trace!(id = ?self.id, "run");

    let mut dispatched = 0;
    loop {
      self.drain_messages();
      dispatched += self.dispatch_ready();

      if self.stop_requested.take() {
        dispatched += self.stop();
        return Ok(dispatched);
      }
      if let RunMode::Until(done) = mode {
        if done() {
          return Ok(dispatched);
        }
      }
      if !self.has_work() {
        return Ok(dispatched);
      }

      let block = !matches!(mode, RunMode::Poll) && !self.has_ready();
      match self.wait(if block { None } else { Some(Duration::ZERO) }) {
        Ok(()) => {}
        Err(err) if err == ErrorCode::INTERRUPTED => continue,
        Err(err) => return Err(err),
      }

      if let RunMode::Poll = mode {
        self.drain_messages();
        dispatched += self.dispatch_ready();
        if self.stop_requested.take() {
          dispatched += self.stop();
        }
        return Ok(dispatched);
      }
    }
  }

  fn has_ready(&self) -> bool {
    !self.state.borrow().ready.is_empty() || !self.rx.is_empty()
  }

  fn has_work(&self) -> bool {
    let st = self.state.borrow();
    !st.ops.is_empty() || !st.tasks.is_empty() || !st.ready.is_empty() || !self.rx.is_empty()
  }

  /// Cancels every operation, lets the callbacks and woken tasks see it,
  /// then drops the tasks that are still suspended.
  fn stop(&self) -> usize {
    self.state.borrow_mut().phase = Phase::Stopped;
    let cancelled = self.cancel_all();
    let dispatched = self.flush();
    let suspended = self.state.borrow_mut().tasks.drain();
    debug!(id = ?self.id, cancelled, dropped_tasks = suspended.len(), "context stopped");
    drop(suspended);
    dispatched
  }

  /// Cancels every pending operation and forgets every registration.
  fn cancel_all(&self) -> usize {
    let mut st = self.state.borrow_mut();
    let st = &mut *st;
    for (fd, _) in st.fds.drain() {
      if let Err(err) = self.poller.delete(fd) {
        warn!(fd, error = %err, "failed to deregister descriptor");
      }
    }
    let ops = st.ops.drain();
    let cancelled = ops.len();
    for mut op in ops {
      op.fail(ErrorCode::CANCELLED);
      st.ready.push_back(Ready::Op(op));
    }
    cancelled
  }

  /// Dispatches until nothing is queued. Only used once the context no
  /// longer accepts work, so it terminates.
  fn flush(&self) -> usize {
    let mut dispatched = 0;
    loop {
      self.drain_messages();
      match self.dispatch_ready() {
        0 => return dispatched,
        n => dispatched += n,
      }
    }
  }

  fn drain_messages(&self) {
    while let Ok(message) = self.rx.try_recv() {
      match message {
        Message::Stop => self.stop_requested.set(true),
        Message::Post(f) => self.state.borrow_mut().ready.push_back(Ready::Post(f)),
        Message::Wake(key) => {
          self.state.borrow_mut().ready.push_back(Ready::Task(key))
        }
      }
    }
  }

  /// Runs what was queued when the call started. Work queued by the
  /// callbacks themselves waits for the next round.
  fn dispatch_ready(&self) -> usize {
    let batch = self.state.borrow().ready.len();
    for _ in 0..batch {
      let Some(item) = self.state.borrow_mut().ready.pop_front() else {
        return batch;
      };
      match item {
        Ready::Op(op) => op.finish(),
        Ready::Post(f) => f(),
        Ready::Task(key) => self.poll_task(key),
      }
    }
    batch
  }

  fn check_submit(&self, fd: RawFd, intent: Intent) -> Result<()> {
    let st = self.state.borrow();
    if !st.phase.accepts_work() {
      return Err(ErrorCode::CANCELLED);
    }
    if fd < 0 {
      return Err(ErrorCode::BAD_DESCRIPTOR);
    }
    if st.fds.get(&fd).is_some_and(|reg| reg.slots[intent.index()].is_some()) {
      return Err(ConfigError::DuplicateOperation.into());
    }
    Ok(())
  }

  fn submit<O: Operation>(
    &self,
    fd: RawFd,
    op: O,
    callback: Callback<O::Output>,
  ) -> std::result::Result<(), SubmitError<(O, Callback<O::Output>)>> {
    if let Err(err) = self.check_submit(fd, O::INTENT) {
      trace!(fd, intent = ?O::INTENT, %err, "submission refused");
      return Err(SubmitError::new(err, (op, callback)));
    }

    let mut pending: Box<dyn Pending> = Box::new(PendingOp::new(op, callback));
    let mut st = self.state.borrow_mut();
    let st = &mut *st;

    if O::EAGER && pending.attempt(fd) {
      trace!(fd, intent = ?O::INTENT, "completed at submission");
      st.ready.push_back(Ready::Op(pending));
      return Ok(());
    }

    let key = st.ops.insert(pending);
    let registered = st.fds.contains_key(&fd);
    let reg = st.fds.entry(fd).or_default();
    reg.slots[O::INTENT.index()] = Some(key);
    let interest = reg.interest();

    let res = if registered {
      self.poller.modify(fd, fd as u64, interest)
    } else {
      self.poller.add(fd, fd as u64, interest)
    };
    trace!(fd, intent = ?O::INTENT, op = key.as_u64(), ?interest, "submitted");

    if let Err(err) = res {
      if registered {
        self.fail_fd(st, fd, err.into());
      } else {
        st.fds.remove(&fd);
        let mut op = st.ops.remove(key).expect("operation inserted above");
        // epoll refuses regular files, which never block.
        let done = err.raw_os_error() == Some(libc::EPERM) && op.attempt(fd);
        if !done {
          op.fail(err.into());
        }
        st.ready.push_back(Ready::Op(op));
      }
    }
    Ok(())
  }

  /// Removes the registration of `fd` and fails its operations with `err`.
  fn fail_fd(&self, st: &mut State, fd: RawFd, err: ErrorCode) -> usize {
    let Some(reg) = st.fds.remove(&fd) else {
      return 0;
    };
    if let Err(err) = self.poller.delete(fd) {
      warn!(fd, error = %err, "failed to deregister descriptor");
    }
    let mut failed = 0;
    for key in reg.slots.into_iter().flatten() {
      if let Some(mut op) = st.ops.remove(key) {
        trace!(fd, intent = ?op.intent(), op = key.as_u64(), "failing");
        op.fail(err);
        st.ready.push_back(Ready::Op(op));
        failed += 1;
      }
    }
    trace!(fd, failed, %err, "descriptor operations failed");
    failed
  }

  fn wait(&self, timeout: Option<Duration>) -> Result<()> {
    let mut events = self.events.borrow_mut();
    events.wait_on(&self.poller, timeout)?;

    for index in 0..events.len() {
      let Some(event) = events.get(index) else { break };
      if event.key == NOTIFY_KEY {
        self.poller.clear_notify()?;
        continue;
      }
      self.on_ready(event.key as RawFd, event.interest);
    }
    Ok(())
  }

  fn on_ready(&self, fd: RawFd, interest: Interest) {
    let mut st = self.state.borrow_mut();
    let st = &mut *st;
    let Some(reg) = st.fds.get_mut(&fd) else {
      trace!(fd, "readiness for unregistered descriptor");
      return;
    };
    trace!(fd, ?interest, "descriptor ready");

    for intent in Intent::ALL {
      if !intent.interest().intersects(interest) {
        continue;
      }
      let Some(key) = reg.slots[intent.index()] else { continue };
      let op = st.ops.get_mut(key).expect("registered operation not in store");
      if op.attempt(fd) {
        reg.slots[intent.index()] = None;
        let op = st.ops.remove(key).expect("registered operation not in store");
        st.ready.push_back(Ready::Op(op));
      }
    }

    let remaining = reg.interest();
    if remaining.is_none() {
      st.fds.remove(&fd);
      if let Err(err) = self.poller.delete(fd) {
        warn!(fd, error = %err, "failed to deregister descriptor");
      }
    } else if let Err(err) = self.poller.modify(fd, fd as u64, remaining) {
      self.fail_fd(st, fd, err.into());
    } else {
      trace!(fd, ?remaining, "re-armed");
    }
  }
}

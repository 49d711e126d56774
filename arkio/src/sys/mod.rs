//! Readiness polling on top of the OS facility.
//!
//! Registrations are one-shot on every platform: after an event is reported
//! for a descriptor it stays disarmed until it is re-armed with
//! [`ReadinessPoll::modify`].

mod notifier;

#[cfg(linux)]
mod epoll;
#[cfg(linux)]
pub(crate) use epoll::OsPoller;

#[cfg(kqueue)]
mod kqueue;
#[cfg(kqueue)]
pub(crate) use kqueue::OsPoller;

#[cfg(not(any(linux, kqueue)))]
compile_error!("arkio needs epoll (Linux) or kqueue (BSD, macOS)");


pub(crate) use notifier::NOTIFY_KEY;

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Readiness a registration waits for, or an event reports.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
  bits: u8,
}

impl Interest {
  pub const NONE: Self = Self { bits: 0 };
  pub const READ: Self = Self { bits: 1 << 0 };
  pub const WRITE: Self = Self { bits: 1 << 1 };
  pub const READ_AND_WRITE: Self =
    Self { bits: Self::READ.bits | Self::WRITE.bits };

  pub const fn is_readable(self) -> bool {
    self.bits & Self::READ.bits != 0
  }

  pub const fn is_writable(self) -> bool {
    self.bits & Self::WRITE.bits != 0
  }

  pub const fn is_none(self) -> bool {
    self.bits == 0
  }

  pub const fn or(self, other: Self) -> Self {
    Self { bits: self.bits | other.bits }
  }

  pub const fn intersects(self, other: Self) -> bool {
    self.bits & other.bits != 0
  }
}

impl std::ops::BitOr for Interest {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self::Output {
    self.or(rhs)
  }
}

impl std::ops::BitOrAssign for Interest {
  fn bitor_assign(&mut self, rhs: Self) {
    *self = self.or(rhs);
  }
}

impl std::fmt::Debug for Interest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (self.is_readable(), self.is_writable()) {
      (true, true) => f.write_str("READ|WRITE"),
      (true, false) => f.write_str("READ"),
      (false, true) => f.write_str("WRITE"),
      (false, false) => f.write_str("NONE"),
    }
  }
}

/// OS specific readiness poller.
///
/// - **epoll**: one registration per fd carrying both directions.
/// - **kqueue**: one filter per direction; `modify` drops the filters that
///   are no longer wanted.
pub(crate) trait ReadinessPoll {
  type NativeEvent: Copy;

  /// Registers `fd`. Fails if it is already registered.
  fn add(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()>;

  /// Re-arms a registered `fd` with exactly `interest`.
  fn modify(&self, fd: RawFd, key: u64, interest: Interest) -> io::Result<()>;

  fn delete(&self, fd: RawFd) -> io::Result<()>;

  fn wait(
    &self,
    events: &mut [Self::NativeEvent],
    timeout: Option<Duration>,
  ) -> io::Result<usize>;

  /// Wakes a thread blocked in [`wait`](ReadinessPoll::wait). Safe to call
  /// from any thread.
  fn notify(&self) -> io::Result<()>;

  /// Resets the wakeup after an event with [`NOTIFY_KEY`] was seen.
  fn clear_notify(&self) -> io::Result<()>;

  fn event_key(event: &Self::NativeEvent) -> u64;

  fn event_interest(event: &Self::NativeEvent) -> Interest;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
  pub key: u64,
  pub interest: Interest,
}

/// Reusable buffer `wait` drains events into.
pub(crate) struct Events {
  buf: Vec<<OsPoller as ReadinessPoll>::NativeEvent>,
  len: usize,
}

impl Events {
  pub fn with_capacity(capacity: usize) -> Self {
    assert!(capacity > 0, "event buffer needs room for at least one event");
    Self { buf: vec![unsafe { std::mem::zeroed() }; capacity], len: 0 }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Blocks in the poller until at least one event arrives or `timeout`
  /// elapses.
  pub fn wait_on(
    &mut self,
    poller: &OsPoller,
    timeout: Option<Duration>,
  ) -> io::Result<usize> {
    self.len = 0;
    let n = poller.wait(&mut self.buf, timeout)?;
    assert!(n <= self.buf.len(), "poller reported more events than fit");
    self.len = n;
    Ok(n)
  }

  pub fn get(&self, index: usize) -> Option<Event> {
    let native = self.buf[..self.len].get(index)?;
    Some(Event {
      key: OsPoller::event_key(native),
      interest: OsPoller::event_interest(native),
    })
  }
}

pub(crate) fn timeout_to_timespec(
  timeout: Option<Duration>,
) -> Option<libc::timespec> {
  timeout.map(|d| libc::timespec {
    tv_sec: d.as_secs() as libc::time_t,
    tv_nsec: d.subsec_nanos() as libc::c_long,
  })
}

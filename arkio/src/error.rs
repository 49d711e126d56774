//! Error codes delivered on every I/O boundary.
//!
//! Every fallible operation in arkio either returns or delivers a
//! [`Result`]. The error half is an [`ErrorCode`]: a small `Copy` value that
//! can be compared against the sentinels below and rendered with
//! [`ErrorCode::message`].

use std::{fmt, io};

use thiserror::Error;

/// Outcome of an arkio operation.
pub type Result<T> = std::result::Result<T, ErrorCode>;

/// Misuse of the library, detected before any OS interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
  #[error("descriptor is bound to a different context")]
  ContextMismatch,
  #[error("descriptor is not bound to a context")]
  Unbound,
  #[error("an operation of the same kind is already pending on this descriptor")]
  DuplicateOperation,
  #[error("exact transfer size exceeds the buffer")]
  ExactlyOvershoot,
  #[error("context is already running on this thread")]
  Reentrant,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
  /// Platform error number.
  #[error("{}", os_message(.0))]
  Os(i32),
  #[error(transparent)]
  Config(#[from] ConfigError),
  /// The context stopped or went away before the operation completed.
  #[error("operation cancelled")]
  Cancelled,
}

fn os_message(errno: &i32) -> String {
  io::Error::from_raw_os_error(*errno).to_string()
}

impl ErrorCode {
  pub const CANCELLED: Self = Self::Cancelled;
  pub const WOULD_BLOCK: Self = Self::Os(libc::EWOULDBLOCK);
  pub const INTERRUPTED: Self = Self::Os(libc::EINTR);
  pub const IN_PROGRESS: Self = Self::Os(libc::EINPROGRESS);
  pub const CONNECTION_RESET: Self = Self::Os(libc::ECONNRESET);
  pub const CONNECTION_REFUSED: Self = Self::Os(libc::ECONNREFUSED);
  pub const BROKEN_PIPE: Self = Self::Os(libc::EPIPE);
  pub const BAD_DESCRIPTOR: Self = Self::Os(libc::EBADF);
  pub const INVALID_INPUT: Self = Self::Os(libc::EINVAL);

  pub const fn from_errno(errno: i32) -> Self {
    Self::Os(errno)
  }

  /// Captures `errno` of the calling thread.
  pub fn last_os_error() -> Self {
    io::Error::last_os_error().into()
  }

  pub fn raw_os_error(&self) -> Option<i32> {
    match self {
      Self::Os(errno) => Some(*errno),
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }

  pub fn config_error(&self) -> Option<ConfigError> {
    match self {
      Self::Config(err) => Some(*err),
      _ => None,
    }
  }

  /// Human readable description.
  pub fn message(&self) -> String {
    self.to_string()
  }

  pub fn is_would_block(&self) -> bool {
    #[allow(unreachable_patterns)]
    match self {
      Self::Os(libc::EWOULDBLOCK | libc::EAGAIN) => true,
      _ => false,
    }
  }
}

impl fmt::Debug for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Os(errno) => {
        write!(f, "Os({errno}: {})", os_message(errno))
      }
      Self::Config(err) => f.debug_tuple("Config").field(err).finish(),
      Self::Cancelled => f.write_str("Cancelled"),
    }
  }
}

impl From<io::Error> for ErrorCode {
  fn from(err: io::Error) -> Self {
    if let Some(errno) = err.raw_os_error() {
      return Self::Os(errno);
    }
    if let Some(code) =
      err.get_ref().and_then(|inner| inner.downcast_ref::<ErrorCode>())
    {
      return *code;
    }
    let errno = match err.kind() {
      io::ErrorKind::WouldBlock => libc::EWOULDBLOCK,
      io::ErrorKind::Interrupted => libc::EINTR,
      io::ErrorKind::InvalidInput => libc::EINVAL,
      io::ErrorKind::NotFound => libc::ENOENT,
      io::ErrorKind::PermissionDenied => libc::EACCES,
      io::ErrorKind::UnexpectedEof => libc::EPIPE,
      _ => libc::EIO,
    };
    Self::Os(errno)
  }
}

impl From<ErrorCode> for io::Error {
  fn from(code: ErrorCode) -> Self {
    match code {
      ErrorCode::Os(errno) => io::Error::from_raw_os_error(errno),
      ErrorCode::Config(_) => io::Error::new(io::ErrorKind::InvalidInput, code),
      ErrorCode::Cancelled => io::Error::other(code),
    }
  }
}

impl PartialEq<ConfigError> for ErrorCode {
  fn eq(&self, other: &ConfigError) -> bool {
    *self == ErrorCode::Config(*other)
  }
}

/// A submission that was refused.
///
/// The refused work (for example the operation and its callback) is handed
/// back untouched so the caller stays its owner.
pub struct SubmitError<T> {
  error: ErrorCode,
  inner: T,
}

impl<T> SubmitError<T> {
  pub(crate) fn new(error: impl Into<ErrorCode>, inner: T) -> Self {
    Self { error: error.into(), inner }
  }

  pub fn error(&self) -> ErrorCode {
    self.error
  }

  pub fn into_inner(self) -> T {
    self.inner
  }

  pub fn into_parts(self) -> (ErrorCode, T) {
    (self.error, self.inner)
  }

  pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> SubmitError<U> {
    SubmitError { error: self.error, inner: f(self.inner) }
  }
}

impl<T> fmt::Debug for SubmitError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SubmitError").field("error", &self.error).finish_non_exhaustive()
  }
}

impl<T> fmt::Display for SubmitError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "submission refused: {}", self.error)
  }
}

impl<T> std::error::Error for SubmitError<T> {}

impl<T> From<SubmitError<T>> for ErrorCode {
  fn from(err: SubmitError<T>) -> Self {
    err.error
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn os_codes_round_trip_through_io_error() {
    let code = ErrorCode::CONNECTION_RESET;
    let io_err: io::Error = code.into();
    assert_eq!(io_err.raw_os_error(), Some(libc::ECONNRESET));
    assert_eq!(ErrorCode::from(io_err), code);
  }

  #[test]
  fn library_codes_survive_io_error() {
    for code in [ErrorCode::CANCELLED, ConfigError::Reentrant.into()] {
      let io_err: io::Error = code.into();
      assert_eq!(ErrorCode::from(io_err), code);
    }
  }

  #[test]
  fn kinds_without_errno_map_to_platform_codes() {
    let err = io::Error::from(io::ErrorKind::WouldBlock);
    assert!(ErrorCode::from(err).is_would_block());
  }

  #[test]
  fn messages() {
    assert_eq!(ErrorCode::CANCELLED.message(), "operation cancelled");
    assert_eq!(
      ErrorCode::from(ConfigError::ExactlyOvershoot).message(),
      "exact transfer size exceeds the buffer"
    );
    assert!(!ErrorCode::BROKEN_PIPE.message().is_empty());
  }

  #[test]
  fn compare_with_config_error() {
    let code: ErrorCode = ConfigError::DuplicateOperation.into();
    assert_eq!(code, ConfigError::DuplicateOperation);
    assert_eq!(code.config_error(), Some(ConfigError::DuplicateOperation));
    assert_eq!(code.raw_os_error(), None);
  }
}

//! Descriptors and their binding to a context.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use crate::context::Handle;
use crate::error::{ConfigError, Result};

/// An OS handle that operations can be submitted on.
pub trait Descriptor {
  fn raw_fd(&self) -> RawFd;

  /// The context this descriptor's operations run on, if any.
  fn bound_context(&self) -> Option<&Handle>;
}

impl<D: Descriptor + ?Sized> Descriptor for &D {
  fn raw_fd(&self) -> RawFd {
    (**self).raw_fd()
  }

  fn bound_context(&self) -> Option<&Handle> {
    (**self).bound_context()
  }
}

/// An owned descriptor, optionally bound to a context.
///
/// Binding switches the descriptor to non-blocking mode. Dropping a bound
/// descriptor cancels its pending operations and deregisters it before the
/// handle is closed.
pub struct Fd {
  fd: OwnedFd,
  ctx: Option<Handle>,
}

impl Fd {
  pub fn from_owned(fd: OwnedFd, ctx: Option<&Handle>) -> Result<Self> {
    let mut fd = Self { fd, ctx: None };
    if let Some(handle) = ctx {
      fd.bind(handle)?;
    }
    Ok(fd)
  }

  /// Binds to `handle`. Rebinding to the same context is a no-op; binding
  /// to another one while bound is refused.
  pub fn bind(&mut self, handle: &Handle) -> Result<()> {
    match &self.ctx {
      Some(bound) if bound == handle => Ok(()),
      Some(_) => Err(ConfigError::ContextMismatch.into()),
      None => {
        set_nonblocking(self.fd.as_raw_fd())?;
        self.ctx = Some(handle.clone());
        Ok(())
      }
    }
  }

  /// Cancels pending operations and detaches from the context.
  pub fn unbind(&mut self) {
    if let Some(handle) = self.ctx.take() {
      handle.cancel_fd(self.fd.as_raw_fd());
    }
  }

  pub fn try_clone(&self) -> Result<Self> {
    let fd = self.fd.try_clone()?;
    Self::from_owned(fd, self.ctx.as_ref())
  }
}

impl Descriptor for Fd {
  fn raw_fd(&self) -> RawFd {
    self.fd.as_raw_fd()
  }

  fn bound_context(&self) -> Option<&Handle> {
    self.ctx.as_ref()
  }
}

impl AsRawFd for Fd {
  fn as_raw_fd(&self) -> RawFd {
    self.fd.as_raw_fd()
  }
}

impl AsFd for Fd {
  fn as_fd(&self) -> BorrowedFd<'_> {
    self.fd.as_fd()
  }
}

impl IntoRawFd for Fd {
  fn into_raw_fd(mut self) -> RawFd {
    self.unbind();
    let raw = self.fd.as_raw_fd();
    // Unbound now, so forgetting only skips the close.
    std::mem::forget(self);
    raw
  }
}

impl Drop for Fd {
  fn drop(&mut self) {
    self.unbind();
  }
}

impl fmt::Debug for Fd {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Fd")
      .field("fd", &self.fd.as_raw_fd())
      .field("ctx", &self.ctx.as_ref().map(Handle::id))
      .finish()
  }
}

pub(crate) fn set_nonblocking(fd: RawFd) -> Result<()> {
  let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
  if flags & libc::O_NONBLOCK == 0 {
    syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
  }
  Ok(())
}

/// Creates a pipe, `(read end, write end)`, both close-on-exec.
pub fn pipe(ctx: Option<&Handle>) -> Result<(Fd, Fd)> {
  let mut fds = [0 as RawFd; 2];

  #[cfg(apple)]
  {
    syscall!(pipe(fds.as_mut_ptr()))?;
    for fd in fds {
      syscall!(fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
    }
  }
  #[cfg(not(apple))]
  syscall!(pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC))?;

  let (r, w) =
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
  Ok((Fd::from_owned(r, ctx)?, Fd::from_owned(w, ctx)?))
}

/// Creates a connected pair of Unix stream sockets.
pub fn socket_pair(ctx: Option<&Handle>) -> Result<(Fd, Fd)> {
  let mut fds = [0 as RawFd; 2];
  syscall!(socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()))?;
  let (a, b) =
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
  for fd in [a.as_raw_fd(), b.as_raw_fd()] {
    syscall!(fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
    #[cfg(apple)]
    crate::net::set_nosigpipe(fd)?;
  }
  Ok((Fd::from_owned(a, ctx)?, Fd::from_owned(b, ctx)?))
}

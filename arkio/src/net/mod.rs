//! TCP sockets driven by an [`IoContext`](crate::IoContext).
//!
//! [`TcpStream`] and [`TcpListener`] are thin wrappers around a bound
//! [`Fd`](crate::fd::Fd). Reading and writing go through [`crate::io`] or
//! [`crate::awaitable`] like any other descriptor; connecting and accepting
//! have their own callback and awaitable forms.

pub mod addr;
mod tcp;

pub use tcp::{TcpListener, TcpStream};

use std::os::fd::RawFd;

use crate::error::Result;

/// Turns writes to a closed peer into `EPIPE` instead of `SIGPIPE`.
#[cfg(apple)]
pub(crate) fn set_nosigpipe(fd: RawFd) -> Result<()> {
  set_flag(fd, libc::SOL_SOCKET, libc::SO_NOSIGPIPE)
}

pub(crate) fn set_flag(fd: RawFd, level: libc::c_int, name: libc::c_int) -> Result<()> {
  let on: libc::c_int = 1;
  syscall!(setsockopt(
    fd,
    level,
    name,
    &on as *const libc::c_int as *const libc::c_void,
    std::mem::size_of::<libc::c_int>() as libc::socklen_t
  ))?;
  Ok(())
}

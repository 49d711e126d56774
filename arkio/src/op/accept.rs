use std::io;
use std::net::SocketAddr;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use super::{Intent, Operation};
use crate::error::Result;
use crate::net::addr::RawAddr;

/// Accepts one connection. The accepted socket is already non-blocking and
/// close-on-exec.
pub struct Accept {
  peer: RawAddr,
}

impl Accept {
  pub fn new() -> Self {
    Self { peer: RawAddr::empty() }
  }
}

impl Default for Accept {
  fn default() -> Self {
    Self::new()
  }
}

impl Operation for Accept {
  type Output = Result<(OwnedFd, SocketAddr)>;

  const INTENT: Intent = Intent::Accept;

  fn attempt(&mut self, fd: RawFd) -> io::Result<usize> {
    self.peer = RawAddr::empty();
    let conn = accept_nonblocking(fd, &mut self.peer)?;
    Ok(conn as usize)
  }

  fn complete(self, res: Result<usize>) -> Self::Output {
    // SAFETY: a successful attempt returned a fresh descriptor we own.
    let fd = unsafe { OwnedFd::from_raw_fd(res? as RawFd) };
    let peer = self.peer.to_std()?;
    Ok((fd, peer))
  }
}

#[cfg(any(
  target_os = "linux",
  target_os = "android",
  target_os = "freebsd",
  target_os = "dragonfly",
  target_os = "openbsd",
  target_os = "netbsd"
))]
fn accept_nonblocking(fd: RawFd, peer: &mut RawAddr) -> io::Result<RawFd> {
  syscall!(accept4(
    fd,
    peer.as_mut_ptr(),
    peer.len_mut(),
    libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK
  ))
}

#[cfg(not(any(
  target_os = "linux",
  target_os = "android",
  target_os = "freebsd",
  target_os = "dragonfly",
  target_os = "openbsd",
  target_os = "netbsd"
)))]
fn accept_nonblocking(fd: RawFd, peer: &mut RawAddr) -> io::Result<RawFd> {
  let conn = syscall!(accept(fd, peer.as_mut_ptr(), peer.len_mut()))?;
  // Close the socket if either fcntl fails.
  let owned = unsafe { OwnedFd::from_raw_fd(conn) };
  syscall!(fcntl(conn, libc::F_SETFD, libc::FD_CLOEXEC))?;
  syscall!(fcntl(conn, libc::F_SETFL, libc::O_NONBLOCK))?;
  Ok(std::os::fd::IntoRawFd::into_raw_fd(owned))
}

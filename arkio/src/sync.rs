//! Blocking reads and writes on any [`Descriptor`].
//!
//! These work on bound and unbound descriptors alike and never touch a
//! context. A bound descriptor is non-blocking, so when the OS reports
//! would-block the calling thread parks in `poll(2)` until the descriptor
//! is ready.
//!
//! [`read`] and [`write`] follow the same rules as their asynchronous
//! counterparts in [`crate::io`]: errors win, end-of-file ends the
//! transfer successfully, and the [`CompletionCondition`] decides the rest.

use std::io;
use std::os::fd::RawFd;

use crate::completion::CompletionCondition;
use crate::error::Result;
use crate::fd::Descriptor;
use crate::op::{would_block, write_bytes};

/// Reads once. `Ok(0)` means end-of-file (or an empty `buf`).
pub fn read_some<D>(desc: &D, buf: &mut [u8]) -> Result<usize>
where
  D: Descriptor + ?Sized,
{
  let fd = desc.raw_fd();
  retry(fd, libc::POLLIN, || {
    let n = syscall!(read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()))?;
    Ok(n as usize)
  })
}

/// Writes once; the count may be short.
pub fn write_some<D>(desc: &D, buf: &[u8]) -> Result<usize>
where
  D: Descriptor + ?Sized,
{
  let fd = desc.raw_fd();
  #[cfg(linux)]
  let mut socket = true;
  retry(fd, libc::POLLOUT, || {
    #[cfg(linux)]
    let res = write_bytes(fd, buf, &mut socket);
    #[cfg(not(linux))]
    let res = write_bytes(fd, buf);
    res
  })
}

/// Reads into `buf` until `cond` is satisfied or the peer reaches
/// end-of-file. Returns the number of bytes read.
pub fn read<D, C>(desc: &D, buf: &mut [u8], mut cond: C) -> Result<usize>
where
  D: Descriptor + ?Sized,
  C: CompletionCondition,
{
  let mut done = 0;
  loop {
    let want = cond.next(buf, done)?;
    if want == 0 || done >= buf.len() {
      return Ok(done);
    }
    let end = done + want.min(buf.len() - done);
    match read_some(desc, &mut buf[done..end])? {
      0 => return Ok(done),
      n => done += n,
    }
  }
}

/// Writes from `buf` until `cond` is satisfied. Returns the number of bytes
/// written.
pub fn write<D, C>(desc: &D, buf: &[u8], mut cond: C) -> Result<usize>
where
  D: Descriptor + ?Sized,
  C: CompletionCondition,
{
  let mut done = 0;
  loop {
    let want = cond.next(buf, done)?;
    if want == 0 || done >= buf.len() {
      return Ok(done);
    }
    let end = done + want.min(buf.len() - done);
    match write_some(desc, &buf[done..end])? {
      0 => return Ok(done),
      n => done += n,
    }
  }
}

/// Runs `f` until it stops failing with `EINTR` or would-block, waiting
/// for `events` in between.
fn retry<F>(fd: RawFd, events: libc::c_short, mut f: F) -> Result<usize>
where
  F: FnMut() -> io::Result<usize>,
{
  loop {
    match f() {
      Ok(n) => return Ok(n),
      Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
      Err(err) if would_block(&err) => wait(fd, events)?,
      Err(err) => return Err(err.into()),
    }
  }
}

fn wait(fd: RawFd, events: libc::c_short) -> Result<()> {
  let mut pfd = libc::pollfd { fd, events, revents: 0 };
  loop {
    match syscall!(poll(&mut pfd, 1, -1)) {
      Ok(_) => return Ok(()),
      Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
      Err(err) => return Err(err.into()),
    }
  }
}

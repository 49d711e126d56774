//! Files and in-memory files.
//!
//! Regular files never block, so operations submitted on a bound [`File`]
//! complete on the first dispatch. They are still useful with a context:
//! the same code path handles files, pipes and sockets.

mod open_options;

pub use open_options::OpenOptions;

use std::ffi::OsString;
use std::io::SeekFrom;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use crate::context::Handle;
use crate::error::{ErrorCode, Result};
use crate::fd::{Descriptor, Fd};

/// A file on disk.
#[derive(Debug)]
pub struct File {
  fd: Fd,
}

impl File {
  /// Opens `path` read-only.
  pub fn open<P: AsRef<Path>>(path: P, ctx: Option<&Handle>) -> Result<Self> {
    OpenOptions::new().read(true).open(path, ctx)
  }

  /// Opens `path` for writing, creating or truncating it.
  pub fn create<P: AsRef<Path>>(path: P, ctx: Option<&Handle>) -> Result<Self> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path, ctx)
  }

  /// Creates and opens a unique file from `template`, whose last six
  /// characters must be `XXXXXX`. Returns the file and its actual path.
  pub fn create_temp<P: AsRef<Path>>(
    template: P,
    ctx: Option<&Handle>,
  ) -> Result<(Self, PathBuf)> {
    let mut path = template.as_ref().as_os_str().as_bytes().to_vec();
    if !path.ends_with(b"XXXXXX") {
      return Err(ErrorCode::INVALID_INPUT);
    }
    path.push(0);

    let fd = syscall!(mkostemp(
      path.as_mut_ptr() as *mut libc::c_char,
      libc::O_CLOEXEC
    ))?;
    // SAFETY: `mkostemp` returned a fresh descriptor.
    let file = Self::from_owned(unsafe { OwnedFd::from_raw_fd(fd) }, ctx)?;

    path.pop();
    Ok((file, PathBuf::from(OsString::from_vec(path))))
  }

  pub fn from_owned(fd: OwnedFd, ctx: Option<&Handle>) -> Result<Self> {
    Ok(Self { fd: Fd::from_owned(fd, ctx)? })
  }

  pub fn bind(&mut self, handle: &Handle) -> Result<()> {
    self.fd.bind(handle)
  }

  pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
    seek(self.raw_fd(), pos)
  }

  pub fn set_len(&self, len: u64) -> Result<()> {
    set_len(self.raw_fd(), len)
  }
}

/// An anonymous file living in memory.
#[cfg(linux)]
#[derive(Debug)]
pub struct MemFd {
  fd: Fd,
}

#[cfg(linux)]
impl MemFd {
  /// `name` only shows up in `/proc/self/fd`.
  pub fn create(name: &str, ctx: Option<&Handle>) -> Result<Self> {
    let name = std::ffi::CString::new(name).map_err(|_| ErrorCode::INVALID_INPUT)?;
    let fd = syscall!(memfd_create(name.as_ptr(), libc::MFD_CLOEXEC))?;
    // SAFETY: `memfd_create` returned a fresh descriptor.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    Ok(Self { fd: Fd::from_owned(fd, ctx)? })
  }

  pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
    seek(self.raw_fd(), pos)
  }

  pub fn set_len(&self, len: u64) -> Result<()> {
    set_len(self.raw_fd(), len)
  }
}

macro_rules! descriptor {
  ($($ty:ty),*) => {$(
    impl Descriptor for $ty {
      fn raw_fd(&self) -> RawFd {
        self.fd.raw_fd()
      }

      fn bound_context(&self) -> Option<&Handle> {
        self.fd.bound_context()
      }
    }

    impl AsRawFd for $ty {
      fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
      }
    }

    impl AsFd for $ty {
      fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
      }
    }
  )*};
}

descriptor!(File);
#[cfg(linux)]
descriptor!(MemFd);

fn seek(fd: RawFd, pos: SeekFrom) -> Result<u64> {
  let (offset, whence) = match pos {
    SeekFrom::Start(n) => {
      (libc::off_t::try_from(n).map_err(|_| ErrorCode::INVALID_INPUT)?, libc::SEEK_SET)
    }
    SeekFrom::End(n) => (n as libc::off_t, libc::SEEK_END),
    SeekFrom::Current(n) => (n as libc::off_t, libc::SEEK_CUR),
  };
  let pos = syscall!(lseek(fd, offset, whence))?;
  Ok(pos as u64)
}

fn set_len(fd: RawFd, len: u64) -> Result<()> {
  let len = libc::off_t::try_from(len).map_err(|_| ErrorCode::INVALID_INPUT)?;
  syscall!(ftruncate(fd, len))?;
  Ok(())
}

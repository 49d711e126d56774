use std::ffi::CString;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::File;
use crate::context::Handle;
use crate::error::{ErrorCode, Result};

/// Options and flags which can be used to configure how a file is opened.
///
/// Every file is opened close-on-exec.
#[derive(Debug, Clone)]
pub struct OpenOptions {
  read: bool,
  write: bool,
  append: bool,
  truncate: bool,
  create: bool,
  create_new: bool,
  mode: libc::mode_t,
}

impl OpenOptions {
  /// All options are initially `false`; the creation mode is `0o644`.
  #[must_use]
  pub const fn new() -> Self {
    Self {
      read: false,
      write: false,
      append: false,
      truncate: false,
      create: false,
      create_new: false,
      mode: 0o644,
    }
  }

  #[must_use]
  pub const fn read(mut self, read: bool) -> Self {
    self.read = read;
    self
  }

  #[must_use]
  pub const fn write(mut self, write: bool) -> Self {
    self.write = write;
    self
  }

  /// Writes go to the end of the file. Implies write access.
  #[must_use]
  pub const fn append(mut self, append: bool) -> Self {
    self.append = append;
    self
  }

  #[must_use]
  pub const fn truncate(mut self, truncate: bool) -> Self {
    self.truncate = truncate;
    self
  }

  /// Create the file if it does not exist.
  #[must_use]
  pub const fn create(mut self, create: bool) -> Self {
    self.create = create;
    self
  }

  /// Create the file, failing with `EEXIST` if it exists.
  #[must_use]
  pub const fn create_new(mut self, create_new: bool) -> Self {
    self.create_new = create_new;
    self
  }

  /// Permission bits for a newly created file.
  #[must_use]
  pub const fn mode(mut self, mode: u32) -> Self {
    self.mode = mode as libc::mode_t;
    self
  }

  /// Opens `path`, binding the file to `ctx` when given.
  pub fn open<P: AsRef<Path>>(&self, path: P, ctx: Option<&Handle>) -> Result<File> {
    let flags = self.make_flags()?;
    let path = CString::new(path.as_ref().as_os_str().as_bytes())
      .map_err(|_| ErrorCode::INVALID_INPUT)?;
    let fd = syscall!(open(path.as_ptr(), flags, self.mode as libc::c_uint))?;
    // SAFETY: `open` returned a fresh descriptor.
    File::from_owned(unsafe { OwnedFd::from_raw_fd(fd) }, ctx)
  }

  fn make_flags(&self) -> Result<libc::c_int> {
    let mut flags = libc::O_CLOEXEC;

    flags |= match (self.read, self.write || self.append) {
      (true, false) => libc::O_RDONLY,
      (false, true) => libc::O_WRONLY,
      (true, true) => libc::O_RDWR,
      (false, false) => return Err(ErrorCode::INVALID_INPUT),
    };
    if self.append {
      flags |= libc::O_APPEND;
    }

    if self.create_new {
      flags |= libc::O_CREAT | libc::O_EXCL;
    } else if self.create {
      flags |= libc::O_CREAT;
    }

    if self.truncate {
      flags |= libc::O_TRUNC;
    }
    Ok(flags)
  }
}

impl Default for OpenOptions {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn access_mode_is_required() {
    assert_eq!(OpenOptions::new().make_flags(), Err(ErrorCode::INVALID_INPUT));
  }

  #[test]
  fn flag_combinations() {
    let flags = OpenOptions::new().read(true).make_flags().unwrap();
    assert_eq!(flags & libc::O_ACCMODE, libc::O_RDONLY);
    assert_ne!(flags & libc::O_CLOEXEC, 0);

    let flags = OpenOptions::new().append(true).create(true).make_flags().unwrap();
    assert_eq!(flags & libc::O_ACCMODE, libc::O_WRONLY);
    assert_ne!(flags & libc::O_APPEND, 0);
    assert_ne!(flags & libc::O_CREAT, 0);

    let flags = OpenOptions::new()
      .read(true)
      .write(true)
      .create_new(true)
      .truncate(true)
      .make_flags()
      .unwrap();
    assert_eq!(flags & libc::O_ACCMODE, libc::O_RDWR);
    assert_ne!(flags & libc::O_EXCL, 0);
    assert_ne!(flags & libc::O_TRUNC, 0);
  }
}

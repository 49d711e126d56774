//! Copies files to stdout, reading through the event loop.
//!
//! ```sh
//! cargo run --example cat -- Cargo.toml src/lib.rs
//! ```

use arkio::completion::transfer_all;
use arkio::fs::File;
use arkio::{IoContext, awaitable, sync};

/// Fd 1, borrowed for the blocking writes.
struct Stdout;

impl arkio::fd::Descriptor for Stdout {
  fn raw_fd(&self) -> std::os::fd::RawFd {
    libc::STDOUT_FILENO
  }

  fn bound_context(&self) -> Option<&arkio::Handle> {
    None
  }
}

fn main() -> arkio::Result<()> {
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let ctx = IoContext::new()?;
  for path in std::env::args().skip(1) {
    let file = File::open(&path, Some(&ctx.handle()))?;
    ctx.block_on(async move {
      let mut buf = vec![0u8; 1024];
      loop {
        let (res, returned) = awaitable::read_some(&file, buf).await;
        buf = returned;
        match res? {
          0 => return Ok::<(), arkio::ErrorCode>(()),
          n => sync::write(&Stdout, &buf[..n], transfer_all())?,
        };
      }
    })??;
  }
  Ok(())
}

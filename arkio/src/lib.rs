#![cfg_attr(docsrs, feature(doc_cfg))]

//! # arkio - callback-first async I/O
//!
//! arkio drives non-blocking descriptors from a single-threaded event loop
//! built on epoll (Linux) or kqueue (macOS and the BSDs).
//!
//! Work is submitted with a [`Callback`] that the [`IoContext`] invokes
//! exactly once with the terminal result: on success, on error, or with
//! [`ErrorCode::CANCELLED`] when the context stops or goes away first.
//!
//! ## Layers
//!
//! - [`op`]: single non-blocking syscalls (`read`, `write`, `connect`,
//!   `accept`) the context retries on readiness.
//! - [`io`]: composite reads and writes that repeat partial transfers until
//!   a [`completion`] condition is satisfied.
//! - [`awaitable`]: the same operations as futures, run by
//!   [`IoContext::block_on`] and [`Handle::spawn`].
//! - [`sync`]: blocking counterparts for code without a loop.
//!
//! ## Example
//!
//! ```no_run
//! use arkio::{IoContext, completion::transfer_exactly, fd::socket_pair, io};
//!
//! let ctx = IoContext::new()?;
//! let (a, b) = socket_pair(Some(&ctx.handle()))?;
//!
//! io::async_write(&a, b"PING", transfer_exactly(4), |(res, _)| {
//!   assert_eq!(res, Ok(4));
//! })
//! .map_err(|err| err.error())?;
//! io::async_read(&b, vec![0u8; 4], transfer_exactly(4), |(res, buf)| {
//!   assert_eq!(res, Ok(4));
//!   assert_eq!(buf, b"PING");
//! })
//! .map_err(|err| err.error())?;
//!
//! ctx.run()?;
//! # Ok::<(), arkio::ErrorCode>(())
//! ```
//!
//! ## Threading
//!
//! A context and everything bound to it stays on the thread that created
//! it. Other threads talk to it through a [`Remote`].

#[macro_use]
mod macros;

pub mod awaitable;
pub mod buf;
pub mod callback;
pub mod completion;
pub mod context;
pub mod error;
pub mod fd;
pub mod fs;
pub mod io;
pub mod net;
pub mod op;
pub mod sync;
mod sys;

pub use awaitable::{Awaitable, Awaited};
pub use buf::{BufResult, IoBuf, IoBufMut};
pub use callback::Callback;
pub use context::{Builder, ContextId, ContextState, Handle, IoContext, Remote};
pub use error::{ConfigError, ErrorCode, Result, SubmitError};

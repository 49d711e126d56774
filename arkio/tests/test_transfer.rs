mod common;

use arkio::completion::{transfer_all, transfer_at_least, transfer_exactly};
use arkio::fd::{pipe, socket_pair};
use arkio::{ConfigError, ErrorCode, IoContext, io, sync};
use common::{Outcome, init_tracing};
use proptest::prelude::*;

#[test]
fn ping_with_transfer_exactly() {
  init_tracing();
  let ctx = IoContext::new().unwrap();
  let (a, b) = socket_pair(Some(&ctx.handle())).unwrap();

  let wrote = Outcome::new();
  let read = Outcome::new();
  io::async_write(&a, b"PING", transfer_exactly(4), wrote.sink()).unwrap();
  io::async_read(&b, vec![0u8; 4], transfer_exactly(4), read.sink()).unwrap();
  ctx.run().unwrap();

  let wrote = wrote.take();
  assert_eq!(wrote.len(), 1);
  assert_eq!(wrote[0].0, Ok(4));

  let read = read.take();
  assert_eq!(read.len(), 1);
  assert_eq!(read[0].0, Ok(4));
  assert_eq!(read[0].1, b"PING");
}

#[test]
fn eof_mid_transfer_is_partial_success() {
  let ctx = IoContext::new().unwrap();
  let (r, w) = pipe(Some(&ctx.handle())).unwrap();

  let read = Outcome::new();
  io::async_read(&r, vec![0u8; 32], transfer_exactly(32), read.sink()).unwrap();
  sync::write(&w, &[9u8; 5], transfer_all()).unwrap();
  drop(w);
  ctx.run().unwrap();

  let read = read.take();
  assert_eq!(read[0].0, Ok(5));
  assert_eq!(&read[0].1[..5], &[9u8; 5]);
}

#[test]
fn at_least_beyond_buffer_behaves_like_all() {
  let ctx = IoContext::new().unwrap();
  let (r, w) = pipe(Some(&ctx.handle())).unwrap();

  let read = Outcome::new();
  io::async_read(&r, vec![0u8; 6], transfer_at_least(100), read.sink()).unwrap();
  sync::write_some(&w, b"abc").unwrap();
  ctx.poll().unwrap();
  assert_eq!(read.len(), 0);

  sync::write_some(&w, b"defgh").unwrap();
  ctx.run().unwrap();
  let read = read.take();
  assert_eq!(read[0].0, Ok(6));
  assert_eq!(read[0].1, b"abcdef");
}

#[test]
fn overshoot_reaches_callback_not_caller() {
  let ctx = IoContext::new().unwrap();
  let (_r, w) = pipe(Some(&ctx.handle())).unwrap();

  let wrote = Outcome::new();
  io::async_write(&w, vec![1u8; 2], transfer_exactly(3), wrote.sink()).unwrap();
  assert_eq!(wrote.len(), 0);
  ctx.run().unwrap();

  let wrote = wrote.take();
  assert_eq!(wrote[0].0, Err(ConfigError::ExactlyOvershoot.into()));
  assert_eq!(wrote[0].1, vec![1u8; 2]);
}

#[test]
fn single_shot_read_reports_short_count() {
  let ctx = IoContext::new().unwrap();
  let (r, w) = pipe(Some(&ctx.handle())).unwrap();

  let read = Outcome::new();
  io::async_read_some(&r, vec![0u8; 16], read.sink()).unwrap();
  sync::write_some(&w, b"xy").unwrap();
  ctx.run().unwrap();
  assert_eq!(read.take()[0].0, Ok(2));
}

#[test]
fn refusal_hands_everything_back() {
  let other = IoContext::new().unwrap();
  let (r, _w) = pipe(Some(&other.handle())).unwrap();

  let read = Outcome::new();
  io::async_read(&r, vec![0u8; 4], transfer_all(), read.sink()).unwrap();
  let err = io::async_read(&r, vec![5u8; 4], transfer_all(), read.sink()).unwrap_err();
  assert_eq!(err.error(), ConfigError::DuplicateOperation);
  let (buf, _callback) = err.into_inner();
  assert_eq!(buf, vec![5u8; 4]);

  other.stop();
  other.run().unwrap();
  assert_eq!(read.take()[0].0, Err(ErrorCode::CANCELLED));
}

/// Writes `data` through a pipe in random slices while a composite read
/// with `transfer_exactly` collects it.
fn chunked_exactly(data: &[u8], seed: u64) -> Vec<(arkio::Result<usize>, Vec<u8>)> {
  let mut rng = fastrand::Rng::with_seed(seed);
  let ctx = IoContext::new().unwrap();
  let (r, w) = pipe(Some(&ctx.handle())).unwrap();

  let read = Outcome::new();
  io::async_read(&r, vec![0u8; data.len()], transfer_exactly(data.len()), read.sink())
    .unwrap();

  let mut sent = 0;
  while sent < data.len() {
    let chunk = rng.usize(1..=(data.len() - sent).min(64));
    sync::write(&w, &data[sent..sent + chunk], transfer_all()).unwrap();
    sent += chunk;
    ctx.poll().unwrap();
  }
  ctx.run().unwrap();
  read.take()
}

proptest! {
  #[test]
  fn exactly_completes_once_over_any_chunking(
    data in proptest::collection::vec(any::<u8>(), 1..512),
    seed in any::<u64>(),
  ) {
    let out = chunked_exactly(&data, seed);
    prop_assert_eq!(out.len(), 1);
    prop_assert_eq!(out[0].0, Ok(data.len()));
    prop_assert_eq!(&out[0].1, &data);
  }
}

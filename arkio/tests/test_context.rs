mod common;

use std::cell::Cell;
use std::rc::Rc;

use arkio::completion::transfer_all;
use arkio::fd::pipe;
use arkio::op::ReadSome;
use arkio::{Callback, ContextState, ErrorCode, IoContext, io};
use common::{Outcome, init_tracing};

#[test]
fn stop_with_two_pending_cancels_both() {
  init_tracing();
  let ctx = IoContext::new().unwrap();
  let (r1, _w1) = pipe(Some(&ctx.handle())).unwrap();
  let (r2, _w2) = pipe(Some(&ctx.handle())).unwrap();

  let seen = Outcome::new();
  io::async_read(&r1, vec![0u8; 4], transfer_all(), seen.sink()).unwrap();
  io::async_read(&r2, vec![0u8; 4], transfer_all(), seen.sink()).unwrap();
  assert_eq!(ctx.pending_operations(), 2);

  ctx.stop();
  ctx.run().unwrap();

  let seen = seen.take();
  assert_eq!(seen.len(), 2);
  assert!(seen.iter().all(|(res, _)| *res == Err(ErrorCode::CANCELLED)));
  assert_eq!(ctx.pending_operations(), 0);
  assert_eq!(ctx.state(), ContextState::Stopped);
}

#[test]
fn stop_from_callback_cancels_the_rest() {
  let ctx = IoContext::new().unwrap();
  let (r1, w1) = pipe(Some(&ctx.handle())).unwrap();
  let (r2, _w2) = pipe(Some(&ctx.handle())).unwrap();

  let handle = ctx.handle();
  let first = Outcome::new();
  let sink = first.sink();
  io::async_read_some(&r1, vec![0u8; 1], move |out| {
    handle.stop();
    sink(out);
  })
  .unwrap();
  let second = Outcome::new();
  io::async_read_some(&r2, vec![0u8; 1], second.sink()).unwrap();

  arkio::sync::write_some(&w1, b"!").unwrap();
  ctx.run().unwrap();

  assert_eq!(first.take()[0].0, Ok(1));
  assert_eq!(second.take()[0].0, Err(ErrorCode::CANCELLED));
}

#[test]
fn chained_submissions_from_callbacks() {
  let ctx = IoContext::new().unwrap();
  let (r, w) = pipe(Some(&ctx.handle())).unwrap();
  let r = Rc::new(r);
  let rounds = Rc::new(Cell::new(0));

  fn next(r: Rc<arkio::fd::Fd>, rounds: Rc<Cell<u32>>) {
    let again = r.clone();
    io::async_read_some(&*r, vec![0u8; 1], move |(res, _)| {
      if res == Ok(1) {
        rounds.set(rounds.get() + 1);
        next(again, rounds);
      }
    })
    .unwrap();
  }
  next(r.clone(), rounds.clone());

  arkio::sync::write_some(&w, b"abc").unwrap();
  drop(w);
  ctx.run().unwrap();
  assert_eq!(rounds.get(), 3);
}

#[test]
fn every_accepted_operation_fires_once() {
  let ctx = IoContext::new().unwrap();
  let handle = ctx.handle();
  let fired = Rc::new(Cell::new(0));

  let mut pipes = Vec::new();
  for _ in 0..16 {
    let (r, w) = pipe(Some(&handle)).unwrap();
    let fired = fired.clone();
    handle
      .submit(&r, ReadSome::new(vec![0u8; 1]), Callback::new(move |_| fired.set(fired.get() + 1)))
      .unwrap();
    pipes.push((r, w));
  }
  for (_, w) in pipes.iter().step_by(2) {
    arkio::sync::write_some(w, b"x").unwrap();
  }
  ctx.poll().unwrap();
  assert_eq!(fired.get(), 8);

  drop(ctx);
  assert_eq!(fired.get(), 16);
}

#[test]
fn builder_settings_apply() {
  let ctx = IoContext::builder().event_capacity(1).op_capacity(2).build().unwrap();
  let (r1, w1) = pipe(Some(&ctx.handle())).unwrap();
  let (r2, w2) = pipe(Some(&ctx.handle())).unwrap();

  let seen = Outcome::new();
  io::async_read_some(&r1, vec![0u8; 1], seen.sink()).unwrap();
  io::async_read_some(&r2, vec![0u8; 1], seen.sink()).unwrap();
  arkio::sync::write_some(&w1, b"1").unwrap();
  arkio::sync::write_some(&w2, b"2").unwrap();
  ctx.run().unwrap();
  assert_eq!(seen.len(), 2);
}

#[test]
fn restart_after_stop() {
  let ctx = IoContext::new().unwrap();
  ctx.stop();
  ctx.run().unwrap();
  assert_eq!(ctx.state(), ContextState::Stopped);

  ctx.restart();
  let ran = Rc::new(Cell::new(false));
  let flag = ran.clone();
  ctx.handle().post(move || flag.set(true)).unwrap();
  ctx.run().unwrap();
  assert!(ran.get());
  assert_eq!(ctx.state(), ContextState::Idle);
}

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use arkio::completion::transfer_all;
use arkio::fd::pipe;
use arkio::{ContextState, ErrorCode, IoContext, io};
use common::Outcome;

#[test]
fn remote_stop_interrupts_blocking_run() {
  let ctx = IoContext::new().unwrap();
  let (r, _w) = pipe(Some(&ctx.handle())).unwrap();
  let seen = Outcome::new();
  io::async_read(&r, vec![0u8; 8], transfer_all(), seen.sink()).unwrap();

  let remote = ctx.remote();
  let stopper = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    remote.stop()
  });

  ctx.run().unwrap();
  stopper.join().unwrap().unwrap();
  assert_eq!(ctx.state(), ContextState::Stopped);
  assert_eq!(seen.take()[0].0, Err(ErrorCode::CANCELLED));
}

#[test]
fn posts_from_many_threads_all_run() {
  let ctx = IoContext::new().unwrap();
  let (r, _w) = pipe(Some(&ctx.handle())).unwrap();
  let seen = Outcome::new();
  // Keeps the loop alive until the final stop.
  io::async_read(&r, vec![0u8; 1], transfer_all(), seen.sink()).unwrap();

  let count = Arc::new(AtomicUsize::new(0));
  let workers: Vec<_> = (0..4)
    .map(|_| {
      let remote = ctx.remote();
      let count = count.clone();
      thread::spawn(move || {
        for _ in 0..25 {
          let count = count.clone();
          remote
            .post(move || {
              count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
      })
    })
    .collect();

  let remote = ctx.remote();
  let done = count.clone();
  let stopper = thread::spawn(move || {
    while done.load(Ordering::SeqCst) < 100 {
      thread::sleep(Duration::from_millis(1));
    }
    remote.stop().unwrap();
  });

  ctx.run().unwrap();
  for worker in workers {
    worker.join().unwrap();
  }
  stopper.join().unwrap();
  assert_eq!(count.load(Ordering::SeqCst), 100);
}

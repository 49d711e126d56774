mod common;

use std::cell::Cell;
use std::rc::Rc;

use arkio::awaitable::{self, Awaitable};
use arkio::completion::{transfer_all, transfer_exactly};
use arkio::fd::{pipe, socket_pair};
use arkio::net::{TcpListener, TcpStream};
use arkio::{ConfigError, ErrorCode, IoContext};

#[test]
fn read_and_write_as_futures() {
  let ctx = IoContext::new().unwrap();
  let (a, b) = socket_pair(Some(&ctx.handle())).unwrap();

  let (wrote, (read, buf)) = ctx
    .block_on(async move {
      let (wrote, _) = awaitable::write(&a, b"PING", transfer_exactly(4)).await;
      let read = awaitable::read(&b, vec![0u8; 4], transfer_exactly(4)).await;
      (wrote, read)
    })
    .unwrap();

  assert_eq!(wrote, Ok(4));
  assert_eq!(read, Ok(4));
  assert_eq!(buf, b"PING");
}

#[test]
fn connect_and_accept_as_futures() {
  common::init_tracing();
  let ctx = IoContext::new().unwrap();
  let handle = ctx.handle();
  let listener =
    TcpListener::bind_sync("127.0.0.1:0".parse().unwrap(), Some(&handle)).unwrap();
  let addr = listener.local_addr().unwrap();

  let accepted = Rc::new(Cell::new(false));
  let flag = accepted.clone();
  handle
    .spawn(async move {
      let (stream, _peer) = awaitable::accept_with_addr(&listener).await.unwrap();
      let (res, buf) = awaitable::read(&stream, vec![0u8; 5], transfer_all()).await;
      assert_eq!(res, Ok(5));
      assert_eq!(buf, b"hello");
      flag.set(true);
    })
    .unwrap();

  let client = TcpStream::create(Some(&handle)).unwrap();
  let sent = ctx
    .block_on(async move {
      awaitable::connect(&client, addr).await?;
      let (res, _) = awaitable::write_some(&client, b"hello").await;
      res
    })
    .unwrap();
  assert_eq!(sent, Ok(5));

  ctx.run().unwrap();
  assert!(accepted.get());
}

#[test]
fn accept_without_address() {
  let ctx = IoContext::new().unwrap();
  let handle = ctx.handle();
  let listener =
    TcpListener::bind_sync("127.0.0.1:0".parse().unwrap(), Some(&handle)).unwrap();
  let addr = listener.local_addr().unwrap();

  let client = TcpStream::create(Some(&handle)).unwrap();
  client.async_connect(addr, |_| {}).unwrap();

  let stream = ctx
    .block_on(async move { awaitable::accept(&listener).await })
    .unwrap()
    .unwrap();
  assert!(stream.peer_addr().unwrap().ip().is_loopback());
}

#[test]
fn refusal_resolves_immediately() {
  let ctx = IoContext::new().unwrap();
  let (unbound, _w) = pipe(None).unwrap();

  let (res, buf) = ctx
    .block_on(async move { awaitable::read_some(&unbound, vec![3u8; 2]).await })
    .unwrap();
  assert_eq!(res, Err(ConfigError::Unbound.into()));
  assert_eq!(buf, vec![3u8; 2]);
}

#[test]
fn abandoned_future_leaves_operation_to_stop() {
  let ctx = IoContext::new().unwrap();
  let (r, _w) = pipe(Some(&ctx.handle())).unwrap();
  let r = Rc::new(r);

  let reader = r.clone();
  ctx
    .handle()
    .spawn(async move {
      let mut fut = std::pin::pin!(awaitable::read_some(&*reader, vec![0u8; 1]).awaited());
      // Poll once so the read is submitted, then give up on it.
      std::future::poll_fn(|cx| {
        let _ = fut.as_mut().poll(cx);
        std::task::Poll::Ready(())
      })
      .await;
    })
    .unwrap();

  ctx.poll().unwrap();
  assert_eq!(ctx.pending_operations(), 1);

  ctx.stop();
  ctx.run().unwrap();
  assert_eq!(ctx.pending_operations(), 0);
}

#[test]
fn stop_resumes_awaiting_future_with_cancellation() {
  let ctx = IoContext::new().unwrap();
  let (r, _w) = pipe(Some(&ctx.handle())).unwrap();
  let handle = ctx.handle();
  ctx.handle().post(move || handle.stop()).unwrap();

  let (res, _) = ctx
    .block_on(async move { awaitable::read_some(&r, vec![0u8; 1]).await })
    .unwrap();
  assert_eq!(res, Err(ErrorCode::CANCELLED));
  assert_eq!(ctx.state(), arkio::ContextState::Stopped);
}

#[test]
fn task_woken_from_another_thread_keeps_run_going() {
  let ctx = IoContext::new().unwrap();
  let finished = Rc::new(Cell::new(false));
  let parked = std::sync::Arc::new(std::sync::Mutex::new(None::<std::task::Waker>));

  let slot = parked.clone();
  let flag = finished.clone();
  ctx
    .handle()
    .spawn(async move {
      let mut first = true;
      std::future::poll_fn(|cx| {
        if !std::mem::take(&mut first) {
          return std::task::Poll::Ready(());
        }
        *slot.lock().unwrap() = Some(cx.waker().clone());
        std::task::Poll::Pending
      })
      .await;
      flag.set(true);
    })
    .unwrap();
  ctx.poll().unwrap();

  let waker = parked.lock().unwrap().take().unwrap();
  let waking = std::thread::spawn(move || {
    std::thread::sleep(std::time::Duration::from_millis(50));
    waker.wake();
  });

  ctx.run().unwrap();
  waking.join().unwrap();
  assert!(finished.get());
}

#[test]
fn block_on_without_progress_is_cancelled_by_stop() {
  let ctx = IoContext::new().unwrap();
  let remote = ctx.remote();
  let stopper = std::thread::spawn(move || {
    std::thread::sleep(std::time::Duration::from_millis(20));
    remote.stop()
  });

  let out = ctx.block_on(std::future::pending::<()>());
  stopper.join().unwrap().unwrap();
  assert_eq!(out, Err(ErrorCode::CANCELLED));
}

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use arkio::net::{TcpListener, TcpStream};
use arkio::{Handle, IoContext};

/// Installs a test-writer subscriber once. `RUST_LOG` style filtering is
/// not needed here; everything at `trace` goes to the captured output.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::TRACE)
    .with_test_writer()
    .try_init();
}

/// A shared slot that callbacks fill in.
pub struct Outcome<T>(Rc<RefCell<Vec<T>>>);

impl<T: 'static> Outcome<T> {
  pub fn new() -> Self {
    Self(Rc::new(RefCell::new(Vec::new())))
  }

  pub fn sink(&self) -> impl FnOnce(T) + 'static {
    let seen = self.0.clone();
    move |value| seen.borrow_mut().push(value)
  }

  pub fn len(&self) -> usize {
    self.0.borrow().len()
  }

  pub fn take(&self) -> Vec<T> {
    std::mem::take(&mut *self.0.borrow_mut())
  }
}

/// A connected loopback TCP pair, both ends bound to `handle`.
pub fn tcp_pair(ctx: &IoContext) -> (TcpStream, TcpStream) {
  let handle: Handle = ctx.handle();
  let listener =
    TcpListener::bind_sync("127.0.0.1:0".parse().unwrap(), Some(&handle)).unwrap();
  let addr = listener.local_addr().unwrap();

  let accepted = Outcome::new();
  listener.async_accept(accepted.sink()).unwrap();

  let client = TcpStream::create(Some(&handle)).unwrap();
  let connected = Outcome::new();
  client.async_connect(addr, connected.sink()).unwrap();
  ctx.run().unwrap();

  assert_eq!(connected.take(), vec![Ok(())]);
  let (server, _) = accepted.take().pop().unwrap().unwrap();
  (client, server)
}

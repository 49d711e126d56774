//! Echoes every connection back to its sender.
//!
//! ```sh
//! cargo run --example echo_server -- 127.0.0.1:8080
//! ```

use std::net::SocketAddr;
use std::rc::Rc;

use arkio::completion::{transfer_all, transfer_at_least};
use arkio::net::{TcpListener, TcpStream, addr};
use arkio::{Handle, IoContext, io};

struct EchoService {
  stream: TcpStream,
  peer: SocketAddr,
}

impl EchoService {
  fn new(stream: TcpStream, peer: SocketAddr) -> Rc<Self> {
    println!("connected with peer {}", addr::to_string(&peer));
    Rc::new(Self { stream, peer })
  }

  fn do_echo(self: Rc<Self>) {
    let this = self.clone();
    let res = io::async_read(
      &self.stream,
      vec![0u8; 1024],
      transfer_at_least(1),
      move |(res, buf)| this.handle_read(res, buf),
    );
    if let Err(err) = res {
      eprintln!("read refused: {}", err.error());
    }
  }

  fn handle_read(self: Rc<Self>, res: arkio::Result<usize>, mut buf: Vec<u8>) {
    match res {
      Ok(0) => {}
      Ok(n) => {
        buf.truncate(n);
        let this = self.clone();
        let res = io::async_write(&self.stream, buf, transfer_all(), move |(res, _)| {
          this.handle_write(res)
        });
        if let Err(err) = res {
          eprintln!("write refused: {}", err.error());
        }
      }
      Err(err) => eprintln!("{err}"),
    }
  }

  fn handle_write(self: Rc<Self>, res: arkio::Result<usize>) {
    match res {
      Ok(_) => self.do_echo(),
      Err(err) => eprintln!("{err}"),
    }
  }
}

impl Drop for EchoService {
  fn drop(&mut self) {
    println!("closed connection to {}", addr::to_string(&self.peer));
  }
}

struct EchoServer {
  listener: TcpListener,
}

impl EchoServer {
  fn run(self: Rc<Self>) {
    let this = self.clone();
    let res = self.listener.async_accept(move |res| this.handle_connection(res));
    if let Err(err) = res {
      eprintln!("accept refused: {}", err.error());
    }
  }

  fn handle_connection(self: Rc<Self>, res: arkio::Result<(TcpStream, SocketAddr)>) {
    match res {
      Ok((stream, peer)) => EchoService::new(stream, peer).do_echo(),
      Err(err) => eprintln!("{err}"),
    }
    self.run();
  }
}

fn listen(handle: &Handle) -> arkio::Result<TcpListener> {
  let text = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:8080".into());
  let local = addr::parse(&text)?;
  let listener = TcpListener::bind_sync(local, Some(handle))?;
  println!("listening on {}", addr::to_string(&listener.local_addr()?));
  Ok(listener)
}

fn main() -> arkio::Result<()> {
  tracing_subscriber::fmt::init();

  let ctx = IoContext::new()?;
  let listener = listen(&ctx.handle())?;
  Rc::new(EchoServer { listener }).run();

  ctx.run()
}

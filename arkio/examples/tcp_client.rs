//! Sends an HTTP request and prints the start of the response.
//!
//! ```sh
//! cargo run --example tcp_client -- 93.184.215.14:80 example.com
//! ```

use arkio::awaitable;
use arkio::completion::{transfer_all, transfer_at_least};
use arkio::net::{TcpStream, addr};
use arkio::IoContext;

fn main() -> arkio::Result<()> {
  tracing_subscriber::fmt::init();

  let mut args = std::env::args().skip(1);
  let peer = addr::parse(&args.next().unwrap_or_else(|| "127.0.0.1:80".into()))?;
  let host = args.next().unwrap_or_else(|| "localhost".into());

  let ctx = IoContext::new()?;
  let stream = TcpStream::create_for(&peer, Some(&ctx.handle()))?;

  let response = ctx.block_on(async move {
    awaitable::connect(&stream, peer).await?;
    println!("connected to {}", addr::to_string(&peer));

    let request = format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    let (res, _) = awaitable::write(&stream, request, transfer_all()).await;
    res?;

    let (res, mut buf) =
      awaitable::read(&stream, vec![0u8; 1024], transfer_at_least(1)).await;
    buf.truncate(res?);
    Ok::<_, arkio::ErrorCode>(buf)
  })??;

  print!("{}", String::from_utf8_lossy(&response));
  Ok(())
}

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use super::addr::RawAddr;
use crate::callback::Callback;
use crate::context::Handle;
use crate::error::{ConfigError, Result, SubmitError};
use crate::fd::{Descriptor, Fd};
use crate::op::{Accept, Connect, Intent, Operation};

/// A TCP connection.
///
/// Created unconnected with [`create`](Self::create) and then connected
/// through [`async_connect`](Self::async_connect) or
/// [`awaitable::connect`](crate::awaitable::connect), or handed out by a
/// [`TcpListener`].
///
/// ```no_run
/// use arkio::{IoContext, net::TcpStream};
///
/// let ctx = IoContext::new()?;
/// let stream = TcpStream::create(Some(&ctx.handle()))?;
/// let peer = "127.0.0.1:7000".parse().unwrap();
///
/// stream
///   .async_connect(peer, |res| println!("connected: {res:?}"))
///   .map_err(|err| err.error())?;
/// ctx.run()?;
/// # Ok::<(), arkio::ErrorCode>(())
/// ```
#[derive(Debug)]
pub struct TcpStream {
  fd: Fd,
}

impl TcpStream {
  /// An unconnected IPv4 socket.
  pub fn create(ctx: Option<&Handle>) -> Result<Self> {
    Self::from_owned(socket(libc::AF_INET)?, ctx)
  }

  /// An unconnected IPv6 socket.
  pub fn create_v6(ctx: Option<&Handle>) -> Result<Self> {
    Self::from_owned(socket(libc::AF_INET6)?, ctx)
  }

  /// An unconnected socket of the family `addr` belongs to.
  pub fn create_for(addr: &SocketAddr, ctx: Option<&Handle>) -> Result<Self> {
    match addr {
      SocketAddr::V4(_) => Self::create(ctx),
      SocketAddr::V6(_) => Self::create_v6(ctx),
    }
  }

  pub fn from_owned(fd: OwnedFd, ctx: Option<&Handle>) -> Result<Self> {
    #[cfg(apple)]
    super::set_nosigpipe(fd.as_raw_fd())?;
    Ok(Self { fd: Fd::from_owned(fd, ctx)? })
  }

  /// Binds to `handle`. See [`Fd::bind`].
  pub fn bind_context(&mut self, handle: &Handle) -> Result<()> {
    self.fd.bind(handle)
  }

  /// Starts connecting to `addr`. `callback` receives the outcome of the
  /// handshake.
  pub fn async_connect<F>(
    &self,
    addr: SocketAddr,
    callback: F,
  ) -> std::result::Result<(), SubmitError<Callback<Result<()>>>>
  where
    F: FnOnce(Result<()>) + 'static,
  {
    let callback = Callback::new(callback);
    let Some(handle) = self.fd.bound_context() else {
      return Err(SubmitError::new(ConfigError::Unbound, callback));
    };
    handle
      .submit(self, Connect::new(addr), callback)
      .map_err(|err| err.map(|(_, callback)| callback))
  }

  pub fn peer_addr(&self) -> Result<SocketAddr> {
    let mut addr = RawAddr::empty();
    syscall!(getpeername(self.raw_fd(), addr.as_mut_ptr(), addr.len_mut()))?;
    addr.to_std()
  }

  pub fn local_addr(&self) -> Result<SocketAddr> {
    local_addr(self.raw_fd())
  }

  pub fn shutdown(&self, how: Shutdown) -> Result<()> {
    let how = match how {
      Shutdown::Read => libc::SHUT_RD,
      Shutdown::Write => libc::SHUT_WR,
      Shutdown::Both => libc::SHUT_RDWR,
    };
    syscall!(shutdown(self.raw_fd(), how))?;
    Ok(())
  }

  pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
    let on = nodelay as libc::c_int;
    syscall!(setsockopt(
      self.raw_fd(),
      libc::IPPROTO_TCP,
      libc::TCP_NODELAY,
      &on as *const libc::c_int as *const libc::c_void,
      std::mem::size_of::<libc::c_int>() as libc::socklen_t
    ))?;
    Ok(())
  }
}

impl Descriptor for TcpStream {
  fn raw_fd(&self) -> RawFd {
    self.fd.raw_fd()
  }

  fn bound_context(&self) -> Option<&Handle> {
    self.fd.bound_context()
  }
}

impl AsRawFd for TcpStream {
  fn as_raw_fd(&self) -> RawFd {
    self.fd.as_raw_fd()
  }
}

impl AsFd for TcpStream {
  fn as_fd(&self) -> BorrowedFd<'_> {
    self.fd.as_fd()
  }
}

/// A listening TCP socket.
///
/// ```no_run
/// use arkio::{IoContext, net::TcpListener};
///
/// let ctx = IoContext::new()?;
/// let listener =
///   TcpListener::bind_sync("127.0.0.1:0".parse().unwrap(), Some(&ctx.handle()))?;
///
/// listener
///   .async_accept(|res| match res {
///     Ok((_stream, peer)) => println!("accepted {peer}"),
///     Err(err) => eprintln!("accept failed: {err}"),
///   })
///   .map_err(|err| err.error())?;
/// ctx.run()?;
/// # Ok::<(), arkio::ErrorCode>(())
/// ```
#[derive(Debug)]
pub struct TcpListener {
  fd: Fd,
}

impl TcpListener {
  /// An IPv4 socket with `SO_REUSEADDR`, not yet bound.
  pub fn create(ctx: Option<&Handle>) -> Result<Self> {
    Self::with_family(libc::AF_INET, ctx)
  }

  pub fn create_v6(ctx: Option<&Handle>) -> Result<Self> {
    Self::with_family(libc::AF_INET6, ctx)
  }

  fn with_family(domain: libc::c_int, ctx: Option<&Handle>) -> Result<Self> {
    let fd = socket(domain)?;
    super::set_flag(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_REUSEADDR)?;
    Ok(Self { fd: Fd::from_owned(fd, ctx)? })
  }

  /// Creates, binds and listens in one go.
  pub fn bind_sync(addr: SocketAddr, ctx: Option<&Handle>) -> Result<Self> {
    let listener = match addr {
      SocketAddr::V4(_) => Self::create(ctx)?,
      SocketAddr::V6(_) => Self::create_v6(ctx)?,
    };
    listener.bind(addr)?;
    listener.listen(libc::SOMAXCONN)?;
    Ok(listener)
  }

  pub fn bind(&self, addr: SocketAddr) -> Result<()> {
    let raw = RawAddr::from(addr);
    syscall!(bind(self.raw_fd(), raw.as_ptr(), raw.len()))?;
    Ok(())
  }

  pub fn listen(&self, backlog: i32) -> Result<()> {
    syscall!(listen(self.raw_fd(), backlog))?;
    Ok(())
  }

  pub fn local_addr(&self) -> Result<SocketAddr> {
    local_addr(self.raw_fd())
  }

  /// Accepts one connection. The stream handed to `callback` is bound to
  /// the listener's context.
  pub fn async_accept<F>(
    &self,
    callback: F,
  ) -> std::result::Result<(), SubmitError<Callback<Result<(TcpStream, SocketAddr)>>>>
  where
    F: FnOnce(Result<(TcpStream, SocketAddr)>) + 'static,
  {
    let callback = Callback::new(callback);
    let Some(handle) = self.fd.bound_context() else {
      return Err(SubmitError::new(ConfigError::Unbound, callback));
    };
    let op = AcceptStream { accept: Accept::new(), handle: handle.clone() };
    handle
      .submit(self, op, callback)
      .map_err(|err| err.map(|(_, callback)| callback))
  }
}

impl Descriptor for TcpListener {
  fn raw_fd(&self) -> RawFd {
    self.fd.raw_fd()
  }

  fn bound_context(&self) -> Option<&Handle> {
    self.fd.bound_context()
  }
}

impl AsRawFd for TcpListener {
  fn as_raw_fd(&self) -> RawFd {
    self.fd.as_raw_fd()
  }
}

impl AsFd for TcpListener {
  fn as_fd(&self) -> BorrowedFd<'_> {
    self.fd.as_fd()
  }
}

/// [`Accept`] plus binding the new socket to the listener's context.
struct AcceptStream {
  accept: Accept,
  handle: Handle,
}

impl Operation for AcceptStream {
  type Output = Result<(TcpStream, SocketAddr)>;

  const INTENT: Intent = Intent::Accept;

  fn attempt(&mut self, fd: RawFd) -> io::Result<usize> {
    self.accept.attempt(fd)
  }

  fn complete(self, res: Result<usize>) -> Self::Output {
    let (fd, peer) = self.accept.complete(res)?;
    Ok((TcpStream::from_owned(fd, Some(&self.handle))?, peer))
  }
}

fn socket(domain: libc::c_int) -> Result<OwnedFd> {
  #[cfg(not(apple))]
  let fd = syscall!(socket(domain, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0))?;

  #[cfg(apple)]
  let fd = {
    let fd = syscall!(socket(domain, libc::SOCK_STREAM, 0))?;
    if let Err(err) = syscall!(fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC)) {
      unsafe { libc::close(fd) };
      return Err(err.into());
    }
    fd
  };

  // SAFETY: `socket` returned a fresh descriptor.
  Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn local_addr(fd: RawFd) -> Result<SocketAddr> {
  let mut addr = RawAddr::empty();
  syscall!(getsockname(fd, addr.as_mut_ptr(), addr.len_mut()))?;
  addr.to_std()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::IoContext;
  use crate::error::ErrorCode;
  use std::{cell::RefCell, rc::Rc};

  fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
  }

  #[test]
  fn listener_reports_assigned_port() {
    let listener = TcpListener::bind_sync(loopback(), None).unwrap();
    let addr = listener.local_addr().unwrap();
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);
  }

  #[test]
  fn connect_and_accept() {
    let ctx = IoContext::new().unwrap();
    let handle = ctx.handle();
    let listener = TcpListener::bind_sync(loopback(), Some(&handle)).unwrap();
    let addr = listener.local_addr().unwrap();

    let accepted = Rc::new(RefCell::new(None));
    let connected = Rc::new(RefCell::new(None));

    listener
      .async_accept({
        let accepted = accepted.clone();
        move |res| *accepted.borrow_mut() = Some(res)
      })
      .unwrap();

    let client = TcpStream::create(Some(&handle)).unwrap();
    client
      .async_connect(addr, {
        let connected = connected.clone();
        move |res| *connected.borrow_mut() = Some(res)
      })
      .unwrap();
    ctx.run().unwrap();

    assert_eq!(connected.borrow_mut().take(), Some(Ok(())));
    let (server, peer) = accepted.borrow_mut().take().unwrap().unwrap();
    assert_eq!(peer, client.local_addr().unwrap());
    assert_eq!(server.peer_addr().unwrap(), client.local_addr().unwrap());
    assert_eq!(server.bound_context(), Some(&handle));
  }

  #[test]
  fn refused_connection_is_reported() {
    let ctx = IoContext::new().unwrap();
    let addr = {
      let probe = TcpListener::bind_sync(loopback(), None).unwrap();
      probe.local_addr().unwrap()
    };

    let outcome = Rc::new(RefCell::new(None));
    let client = TcpStream::create(Some(&ctx.handle())).unwrap();
    client
      .async_connect(addr, {
        let outcome = outcome.clone();
        move |res| *outcome.borrow_mut() = Some(res)
      })
      .unwrap();
    ctx.run().unwrap();
    assert_eq!(
      outcome.borrow_mut().take(),
      Some(Err(ErrorCode::CONNECTION_REFUSED))
    );
  }

  #[test]
  fn unbound_accept_hands_callback_back() {
    let listener = TcpListener::bind_sync(loopback(), None).unwrap();
    let err = listener.async_accept(|_| {}).unwrap_err();
    assert_eq!(err.error(), ConfigError::Unbound);
  }
}

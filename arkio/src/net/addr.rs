//! Conversions between `std::net::SocketAddr` and the C socket address
//! structures, plus the textual form used by the examples.

use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::error::{ErrorCode, Result};

/// A socket address laid out for the kernel.
#[derive(Clone, Copy)]
pub(crate) struct RawAddr {
  storage: libc::sockaddr_storage,
  len: libc::socklen_t,
}

impl RawAddr {
  /// Zeroed storage for the kernel to fill in.
  pub fn empty() -> Self {
    Self {
      storage: unsafe { mem::zeroed() },
      len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
    }
  }

  pub fn as_ptr(&self) -> *const libc::sockaddr {
    &self.storage as *const _ as *const libc::sockaddr
  }

  pub fn as_mut_ptr(&mut self) -> *mut libc::sockaddr {
    &mut self.storage as *mut _ as *mut libc::sockaddr
  }

  pub fn len(&self) -> libc::socklen_t {
    self.len
  }

  pub fn len_mut(&mut self) -> &mut libc::socklen_t {
    &mut self.len
  }

  pub fn family(&self) -> libc::c_int {
    self.storage.ss_family as libc::c_int
  }

  pub fn to_std(&self) -> Result<SocketAddr> {
    match self.family() {
      libc::AF_INET => {
        // SAFETY: the family says the storage holds a sockaddr_in.
        let sin = unsafe { *(self.as_ptr() as *const libc::sockaddr_in) };
        let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
        Ok(SocketAddrV4::new(ip, u16::from_be(sin.sin_port)).into())
      }
      libc::AF_INET6 => {
        // SAFETY: the family says the storage holds a sockaddr_in6.
        let sin6 = unsafe { *(self.as_ptr() as *const libc::sockaddr_in6) };
        Ok(
          SocketAddrV6::new(
            Ipv6Addr::from(sin6.sin6_addr.s6_addr),
            u16::from_be(sin6.sin6_port),
            sin6.sin6_flowinfo,
            sin6.sin6_scope_id,
          )
          .into(),
        )
      }
      _ => Err(ErrorCode::from_errno(libc::EAFNOSUPPORT)),
    }
  }
}

impl From<SocketAddr> for RawAddr {
  fn from(addr: SocketAddr) -> Self {
    let mut raw = RawAddr::empty();
    match addr {
      SocketAddr::V4(v4) => {
        let sin = sockaddr_in(v4);
        // SAFETY: sockaddr_storage is large and aligned enough for any
        // address family.
        unsafe { *(raw.as_mut_ptr() as *mut libc::sockaddr_in) = sin };
        raw.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
      }
      SocketAddr::V6(v6) => {
        let sin6 = sockaddr_in6(v6);
        // SAFETY: as above.
        unsafe { *(raw.as_mut_ptr() as *mut libc::sockaddr_in6) = sin6 };
        raw.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
      }
    }
    raw
  }
}

fn sockaddr_in(addr: SocketAddrV4) -> libc::sockaddr_in {
  let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
  #[cfg(kqueue)]
  {
    sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
  }
  sin.sin_family = libc::AF_INET as libc::sa_family_t;
  sin.sin_port = addr.port().to_be();
  sin.sin_addr = libc::in_addr { s_addr: u32::from(*addr.ip()).to_be() };
  sin
}

fn sockaddr_in6(addr: SocketAddrV6) -> libc::sockaddr_in6 {
  let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
  #[cfg(kqueue)]
  {
    sin6.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
  }
  sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
  sin6.sin6_port = addr.port().to_be();
  sin6.sin6_addr = libc::in6_addr { s6_addr: addr.ip().octets() };
  sin6.sin6_flowinfo = addr.flowinfo();
  sin6.sin6_scope_id = addr.scope_id();
  sin6
}

/// Renders `host:port`, bracketing IPv6 hosts.
pub fn to_string(addr: &SocketAddr) -> String {
  match addr {
    SocketAddr::V4(v4) => format!("{}:{}", v4.ip(), v4.port()),
    SocketAddr::V6(v6) => format!("[{}]:{}", v6.ip(), v6.port()),
  }
}

/// Parses `host:port` where host is a literal IPv4 or bracketed IPv6
/// address.
pub fn parse(text: &str) -> Result<SocketAddr> {
  text.parse().map_err(|_| ErrorCode::INVALID_INPUT)
}

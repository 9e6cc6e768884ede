//! The bound UDP socket a Worker reads datagrams from (see §4.A).
//!
//! The socket is opened with `SO_REUSEADDR`/`SO_REUSEPORT` so that several
//! Workers can share one UDP port; the kernel hashes datagrams to Workers by
//! source address. Once built, the socket is handed to `quinn::Endpoint`,
//! which owns the actual async recv/send loop; this module only owns the
//! bind and buffer-sizing step the spec calls out explicitly.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use stellite_core::{Error, Result};

/// Default send buffer size (~30x the 1452-byte max datagram size).
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 43 * 1024;
/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 256 * 1024;

/// Bind a UDP socket for one Worker with `SO_REUSEPORT` set, so multiple
/// Workers can bind the same `(address, port)` and let the kernel fan out
/// datagrams between them.
pub fn bind_reuseport(
    addr: SocketAddr,
    send_buffer_size: usize,
    recv_buffer_size: usize,
) -> Result<StdUdpSocket> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::from)?;

    socket.set_reuse_address(true).map_err(Error::from)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(Error::from)?;

    if addr.is_ipv6() {
        // Accept both v4 and v6 traffic on a wildcard `::` bind, matching
        // the default bind address named in §6.
        let _ = socket.set_only_v6(false);
    }

    socket.set_send_buffer_size(send_buffer_size).map_err(Error::from)?;
    socket.set_recv_buffer_size(recv_buffer_size).map_err(Error::from)?;
    socket.bind(&addr.into()).map_err(Error::from)?;
    socket.set_nonblocking(true).map_err(Error::from)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_an_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid addr");
        let socket = bind_reuseport(addr, DEFAULT_SEND_BUFFER_SIZE, DEFAULT_RECV_BUFFER_SIZE)
            .expect("bind succeeds");
        assert_ne!(socket.local_addr().expect("has local addr").port(), 0);
    }

    #[test]
    fn two_workers_can_share_one_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid addr");
        let first = bind_reuseport(addr, DEFAULT_SEND_BUFFER_SIZE, DEFAULT_RECV_BUFFER_SIZE)
            .expect("first bind succeeds");
        let bound_addr = first.local_addr().expect("has local addr");
        let second = bind_reuseport(bound_addr, DEFAULT_SEND_BUFFER_SIZE, DEFAULT_RECV_BUFFER_SIZE);
        assert!(second.is_ok(), "SO_REUSEPORT must allow a second bind to the same address");
    }
}

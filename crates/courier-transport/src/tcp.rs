use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{Result, TransportError};

/// Loopback TCP transport.
///
/// Provides bind/accept/connect. Listeners only ever bind loopback
/// addresses; outbound connects may target any address.
pub struct TcpTransport {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `127.0.0.1:port`. Port 0 picks an ephemeral port.
    pub fn bind_loopback(port: u16) -> Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Bind and listen on an explicit loopback address.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        if !addr.ip().is_loopback() {
            return Err(TransportError::NotLoopback(addr));
        }

        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%addr, "listening on loopback tcp");

        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<Channel> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Channel::from_tcp(stream)
    }

    /// Connect to a listening socket (blocking).
    pub fn connect(addr: SocketAddr) -> Result<Channel> {
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected");
        Channel::from_tcp(stream)
    }

    /// Connect with an upper bound on the handshake time.
    pub fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Channel> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, ?timeout, "connected");
        Channel::from_tcp(stream)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "loopback-tcp"
    }
}

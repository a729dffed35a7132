use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use courier_transport::TcpTransport;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{PeerError, Result};

struct ServerInner {
    config: ServerConfig,
    started: AtomicBool,
    listener: RwLock<Option<Arc<TcpTransport>>>,
}

/// Loopback listener that hands accepted connections to the caller.
///
/// What to do with each [`Connection`] is up to the caller. Clones share the
/// same listener, so one thread can block in `accept` while another closes.
#[derive(Clone)]
pub struct TcpServer {
    inner: Arc<ServerInner>,
}

impl TcpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config,
                started: AtomicBool::new(false),
                listener: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Bind the listener and return the bound address.
    ///
    /// Fails with [`PeerError::State`] when already started.
    pub fn start(&self) -> Result<SocketAddr> {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PeerError::state("server is already started"));
        }

        match TcpTransport::bind_loopback(self.inner.config.port) {
            Ok(listener) => {
                let addr = listener.local_addr();
                *self.inner.listener.write() = Some(Arc::new(listener));
                info!(%addr, "server started");
                Ok(addr)
            }
            Err(err) => {
                self.inner.started.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .listener
            .read()
            .as_ref()
            .map(|listener| listener.local_addr())
    }

    fn listener(&self) -> Result<Arc<TcpTransport>> {
        self.inner
            .listener
            .read()
            .clone()
            .ok_or_else(|| PeerError::state("server is not started"))
    }

    /// Block until a client connects.
    ///
    /// Returns [`PeerError::State`] when the server is closed, including when
    /// `close` runs while this call is blocked.
    pub fn accept(&self) -> Result<Connection> {
        let listener = self.listener()?;
        let channel = listener.accept()?;
        if !self.is_started() {
            let _ = channel.shutdown();
            return Err(PeerError::state("server is closed"));
        }
        Connection::new(channel, self.inner.config.protocol.clone())
    }

    /// Unbind the listener. A no-op when not started.
    pub fn close(&self) -> Result<()> {
        let listener = self.inner.listener.write().take();
        self.inner.started.store(false, Ordering::Release);
        let Some(listener) = listener else {
            return Ok(());
        };

        let addr = listener.local_addr();
        // Wake any thread parked in accept; it sees `started == false`.
        if Arc::strong_count(&listener) > 1 {
            match TcpTransport::connect(addr) {
                Ok(channel) => {
                    let _ = channel.shutdown();
                }
                Err(err) => debug!(%addr, error = %err, "wake-up connect failed"),
            }
        }
        info!(%addr, "server closed");
        Ok(())
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("port", &self.inner.config.port)
            .field("local_addr", &self.local_addr())
            .field("started", &self.is_started())
            .finish()
    }
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use courier_frame::Message;
use courier_transport::TcpTransport;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{PeerError, Result};

/// Request/reply client for one server address.
///
/// `open` and `close` may be called from any thread; only one `open` can
/// win, and a failed `open` leaves the client closed and reusable. A `close`
/// that lands while `open` is connecting wins: the new socket is dropped.
pub struct TcpClient {
    addr: SocketAddr,
    config: ClientConfig,
    open: AtomicBool,
    /// Bumped by every `open` and `close`; an `open` only installs its
    /// connection if nothing else ran in between.
    generation: AtomicU64,
    connection: RwLock<Option<Arc<Connection>>>,
}

impl TcpClient {
    pub fn new(addr: SocketAddr, config: ClientConfig) -> Self {
        Self {
            addr,
            config,
            open: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            connection: RwLock::new(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Connect to the server.
    ///
    /// Fails with [`PeerError::State`] when already open, or when `close`
    /// ran while connecting.
    pub fn open(&self) -> Result<()> {
        let generation = self.claim()?;
        match self.connect() {
            Ok(connection) => self.install(generation, connection),
            Err(err) => {
                let _slot = self.connection.write();
                if self.generation.load(Ordering::Acquire) == generation {
                    self.open.store(false, Ordering::Release);
                }
                debug!(addr = %self.addr, error = %err, "client connect failed");
                Err(err)
            }
        }
    }

    fn claim(&self) -> Result<u64> {
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PeerError::state(format!(
                "client for {} is already open",
                self.addr
            )));
        }
        Ok(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    fn install(&self, generation: u64, connection: Connection) -> Result<()> {
        let mut slot = self.connection.write();
        if !self.is_open() || self.generation.load(Ordering::Acquire) != generation {
            drop(slot);
            let _ = connection.close();
            debug!(addr = %self.addr, "client closed while connecting");
            return Err(PeerError::state(format!(
                "client for {} was closed while connecting",
                self.addr
            )));
        }
        *slot = Some(Arc::new(connection));
        info!(addr = %self.addr, "client connected");
        Ok(())
    }

    fn connect(&self) -> Result<Connection> {
        let channel = match self.config.connect_timeout {
            Some(timeout) => TcpTransport::connect_timeout(self.addr, timeout)?,
            None => TcpTransport::connect(self.addr)?,
        };
        Connection::new(channel, self.config.protocol.clone())
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        self.connection
            .read()
            .clone()
            .ok_or_else(|| PeerError::state(format!("client for {} is not open", self.addr)))
    }

    /// Send a request and block for its one reply.
    pub fn send_message(&self, message: &Message) -> Result<Message> {
        self.connection()?.request(message)
    }

    /// Block until the server pushes a message.
    pub fn receive_message(&self) -> Result<Message> {
        self.connection()?.receive_message()
    }

    /// Disconnect. A no-op when already closed.
    pub fn close(&self) -> Result<()> {
        let connection = {
            let mut slot = self.connection.write();
            self.open.store(false, Ordering::Release);
            self.generation.fetch_add(1, Ordering::AcqRel);
            slot.take()
        };
        match connection {
            Some(connection) => {
                debug!(addr = %self.addr, "client closing");
                connection.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use courier_frame::Status;

    use super::*;
    use crate::config::ServerConfig;
    use crate::server::TcpServer;

    fn echo_server() -> (TcpServer, SocketAddr, thread::JoinHandle<()>) {
        let server = TcpServer::new(ServerConfig::default());
        let addr = server.start().unwrap();
        let acceptor = server.clone();
        let handle = thread::spawn(move || {
            let Ok(connection) = acceptor.accept() else {
                return;
            };
            while let Ok(msg) = connection.receive_message() {
                if connection.send_message(&msg.echo()).is_err() {
                    break;
                }
            }
        });
        (server, addr, handle)
    }

    #[test]
    fn send_message_returns_reply() {
        let (server, addr, handle) = echo_server();
        let client = TcpClient::new(addr, ClientConfig::default());
        client.open().unwrap();

        for body in ["one", "two"] {
            let request = Message::text(Status::Request, "text/plain", "UTF-8", body).unwrap();
            let reply = client.send_message(&request).unwrap();
            assert_eq!(reply.status(), Status::ResponseOk);
            assert_eq!(reply.text_payload().unwrap(), body);
        }

        client.close().unwrap();
        handle.join().unwrap();
        server.close().unwrap();
    }

    #[test]
    fn second_open_fails_with_state() {
        let (server, addr, _handle) = echo_server();
        let client = TcpClient::new(addr, ClientConfig::default());
        client.open().unwrap();
        assert!(matches!(client.open(), Err(PeerError::State(_))));
        assert!(client.is_open());
        client.close().unwrap();
        server.close().unwrap();
    }

    #[test]
    fn close_twice_is_ok() {
        let (server, addr, _handle) = echo_server();
        let client = TcpClient::new(addr, ClientConfig::default());
        client.close().unwrap();
        client.open().unwrap();
        client.close().unwrap();
        client.close().unwrap();
        assert!(!client.is_open());
        server.close().unwrap();
    }

    #[test]
    fn failed_open_resets_state() {
        let unused = {
            let listener = TcpTransport::bind_loopback(0).unwrap();
            listener.local_addr()
        };
        let client = TcpClient::new(
            unused,
            ClientConfig {
                connect_timeout: Some(Duration::from_millis(200)),
                ..ClientConfig::default()
            },
        );
        assert!(matches!(client.open(), Err(PeerError::Transport(_))));
        assert!(!client.is_open());
        assert!(matches!(
            client.receive_message(),
            Err(PeerError::State(_))
        ));
    }

    #[test]
    fn close_during_connect_drops_the_new_socket() {
        let (server, addr, handle) = echo_server();
        let client = TcpClient::new(addr, ClientConfig::default());

        let generation = client.claim().unwrap();
        let connection = client.connect().unwrap();
        client.close().unwrap();

        assert!(matches!(
            client.install(generation, connection),
            Err(PeerError::State(_))
        ));
        assert!(!client.is_open());
        assert!(matches!(
            client.receive_message(),
            Err(PeerError::State(_))
        ));
        // The echo loop ends once its peer socket is shut down.
        handle.join().unwrap();

        client.open().unwrap();
        assert!(client.is_open());
        client.close().unwrap();
        server.close().unwrap();
    }

    #[test]
    fn stale_open_does_not_replace_a_newer_one() {
        let (server, addr, _handle) = echo_server();
        let client = TcpClient::new(addr, ClientConfig::default());

        let stale = client.claim().unwrap();
        let connection = client.connect().unwrap();
        client.close().unwrap();
        client.open().unwrap();

        assert!(matches!(
            client.install(stale, connection),
            Err(PeerError::State(_))
        ));
        assert!(client.is_open());
        client.close().unwrap();
        server.close().unwrap();
    }

    #[test]
    fn close_unblocks_receiver() {
        let (server, addr, _handle) = echo_server();
        let client = Arc::new(TcpClient::new(addr, ClientConfig::default()));
        client.open().unwrap();

        let receiver = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.receive_message())
        };
        thread::sleep(Duration::from_millis(50));
        client.close().unwrap();
        assert!(receiver.join().unwrap().is_err());
        server.close().unwrap();
    }
}

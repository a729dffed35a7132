use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_frame::{Message, MessageReader, MessageWriter, Protocol, ProtocolError};
use courier_transport::Channel;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{PeerError, Result};

/// One connected message stream.
///
/// Reads and writes are serialized independently, so one thread can block
/// in [`Connection::receive_message`] while another sends. [`Connection::close`]
/// shuts the socket down, which wakes a blocked reader.
pub struct Connection {
    reader: Mutex<MessageReader<Channel>>,
    writer: Mutex<MessageWriter<Channel>>,
    control: Channel,
    peer_addr: SocketAddr,
    protocol: Protocol,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap a connected channel.
    pub fn new(channel: Channel, protocol: Protocol) -> Result<Self> {
        let peer_addr = channel.peer_addr()?;
        let reader_channel = channel.try_clone()?;
        let control = channel.try_clone()?;

        let reader = MessageReader::for_channel(reader_channel, protocol.clone())?;
        let writer = MessageWriter::for_channel(channel, protocol.clone())?;
        debug!(%peer_addr, "connection established");

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            control,
            peer_addr,
            protocol,
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write one message.
    pub fn send_message(&self, message: &Message) -> Result<()> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        writer
            .write_message(message)
            .map_err(|err| self.map_protocol_error(err))?;
        trace!(peer = %self.peer_addr, status = %message.status(), "sent message");
        Ok(())
    }

    /// Block until one message arrives.
    pub fn receive_message(&self) -> Result<Message> {
        self.ensure_open()?;
        let mut reader = self.reader.lock();
        let message = reader
            .read_message()
            .map_err(|err| self.map_protocol_error(err))?;
        trace!(peer = %self.peer_addr, status = %message.status(), "received message");
        Ok(message)
    }

    /// Send `message` and wait for exactly one reply.
    pub fn request(&self, message: &Message) -> Result<Message> {
        // Reader first, so no other receiver can take the reply.
        let mut reader = self.reader.lock();
        self.send_message(message)?;
        self.ensure_open()?;
        reader
            .read_message()
            .map_err(|err| self.map_protocol_error(err))
    }

    /// Shut the socket down. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.control.shutdown()?;
        debug!(peer = %self.peer_addr, "connection closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PeerError::state("connection is closed"));
        }
        Ok(())
    }

    fn map_protocol_error(&self, err: ProtocolError) -> PeerError {
        if self.is_closed() {
            return PeerError::state("connection is closed");
        }
        if err.is_timeout() {
            let timeout = self
                .protocol
                .config()
                .read_timeout
                .or(self.protocol.config().write_timeout)
                .unwrap_or_default();
            return PeerError::Timeout(timeout);
        }
        match err {
            ProtocolError::ConnectionClosed => {
                PeerError::Disconnected(format!("{} closed the connection", self.peer_addr))
            }
            other => PeerError::Protocol(other),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

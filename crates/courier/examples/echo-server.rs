//! Minimal echo server: accepts one client and answers every message.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal, using the printed address:
//!   cargo run --features cli -- send 127.0.0.1:<port> --text hello

use courier::peer::{PeerError, ServerConfig, TcpServer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = TcpServer::new(ServerConfig::default());
    let addr = server.start()?;
    eprintln!("Listening on {addr}");

    let connection = server.accept()?;
    eprintln!("Client connected: {}", connection.peer_addr());

    loop {
        match connection.receive_message() {
            Ok(message) => {
                eprintln!(
                    "Received {} bytes ({}, {})",
                    message.payload().len(),
                    message.status(),
                    message.mimetype()
                );
                connection.send_message(&message.echo())?;
            }
            Err(PeerError::Disconnected(reason)) => {
                eprintln!("Client disconnected: {reason}");
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    server.close()?;
    Ok(())
}

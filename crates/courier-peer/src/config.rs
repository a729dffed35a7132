use std::time::Duration;

use courier_frame::Protocol;

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Codec, transforms and socket timeouts.
    pub protocol: Protocol,
    /// `None` waits for the OS connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::raw(),
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Loopback port; 0 picks an ephemeral port.
    pub port: u16,
    pub protocol: Protocol,
}

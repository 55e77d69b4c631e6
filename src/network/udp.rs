//! Datagram transport abstraction
//!
//! The sender only needs bind-to-ephemeral, send-to, and close; tests
//! substitute a mock through [`TransportFactory`].

use std::net::UdpSocket;
use std::sync::Arc;

use crate::error::NetworkError;

/// Connectionless datagram socket.
///
/// No ordering, delivery, or duplication guarantees.
pub trait DatagramSocket: Send {
    /// Send one datagram to `host:port`, returning the number of bytes sent
    fn send_to(&self, payload: &[u8], host: &str, port: u16) -> Result<usize, NetworkError>;
}

/// Creates the sender's socket on each `start`
pub type TransportFactory =
    Arc<dyn Fn() -> Result<Box<dyn DatagramSocket>, NetworkError> + Send + Sync>;

/// UDP implementation bound to an ephemeral local port
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to any available local port
    pub fn bind_ephemeral() -> Result<Self, NetworkError> {
        let socket =
            UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        Ok(Self { socket })
    }

    /// Default factory used outside of tests
    pub fn factory() -> TransportFactory {
        Arc::new(|| {
            Self::bind_ephemeral().map(|transport| Box::new(transport) as Box<dyn DatagramSocket>)
        })
    }
}

impl DatagramSocket for UdpTransport {
    fn send_to(&self, payload: &[u8], host: &str, port: u16) -> Result<usize, NetworkError> {
        self.socket
            .send_to(payload, (host, port))
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }
}

//! Network subsystem for UDP audio transport

pub mod sender;
pub mod udp;

pub use sender::{FillCallback, PacketSender};
pub use udp::{DatagramSocket, TransportFactory, UdpTransport};

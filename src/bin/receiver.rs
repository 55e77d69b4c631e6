//! Demo Receiver
//!
//! Binds a UDP port, decodes uplink packets, and reports sequence gaps,
//! peak level, and throughput once per second.

use anyhow::Result;
use std::net::UdpSocket;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_uplink::constants::DEFAULT_TARGET_PORT;
use audio_uplink::AudioPacket;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = match std::env::args().nth(1) {
        Some(port) => port.parse()?,
        None => DEFAULT_TARGET_PORT,
    };

    let socket = UdpSocket::bind(("0.0.0.0", port))?;
    socket.set_read_timeout(Some(Duration::from_millis(500)))?;
    tracing::info!("listening for audio packets on port {port}");

    let mut buf = vec![0u8; 65_536];
    let mut packets_received = 0u64;
    let mut bytes_received = 0u64;
    let mut packets_lost = 0u64;
    let mut last_sequence: Option<u32> = None;
    let mut peak_level = 0.0f32;
    let mut last_report = Instant::now();

    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, addr)) => {
                bytes_received += len as u64;
                match AudioPacket::deserialize(&buf[..len]) {
                    Ok(packet) => {
                        packets_received += 1;
                        if let Some(previous) = last_sequence {
                            let gap = packet.sequence.wrapping_sub(previous);
                            if gap > 1 {
                                packets_lost += (gap - 1) as u64;
                            }
                        }
                        last_sequence = Some(packet.sequence);

                        for &sample in &packet.data {
                            let level = sample.abs();
                            if level > peak_level {
                                peak_level = level;
                            }
                        }
                    }
                    Err(e) => tracing::warn!("bad packet from {addr}: {e}"),
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            if packets_received > 0 {
                tracing::info!(
                    packets = packets_received,
                    lost = packets_lost,
                    kb_received = bytes_received / 1024,
                    peak = format!("{peak_level:.3}"),
                    "stats"
                );
            }
            peak_level = 0.0;
        }
    }
}

//! # Audio Uplink
//!
//! Real-time audio streaming core for plugin hosts: blocks of float samples
//! produced by the host's audio callback cross a lock-free FIFO to a paced
//! sender thread that packetizes them and transmits UDP datagrams.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           PLUGIN HOST                            │
//! │  ┌────────────────┐                      ┌────────────────────┐  │
//! │  │  Audio Thread  │                      │   Control Thread   │  │
//! │  │ (processBlock) │                      │ (editor / UI code) │  │
//! │  └───────┬────────┘                      └─────────┬──────────┘  │
//! │          │ push_audio(block)                       │ prepare /   │
//! │          ▼                                         │ start/stop/ │
//! │  ┌─────────────────────────────────────────────┐  │ set_target  │
//! │  │      AudioStreamManager (stream::manager)    │◄─┘             │
//! │  │   silence gate · sequencing · timestamps     │                │
//! │  └───────┬──────────────────────────▲──────────┘                │
//! │          │ SampleFifo::push         │ fill callback             │
//! │          ▼                          │ (SampleFifo::pop)         │
//! │  ┌──────────────────┐     ┌─────────┴─────────┐                 │
//! │  │    SampleFifo     │     │   PacketSender    │                 │
//! │  │ (audio::buffer)   │     │ (network::sender) │                 │
//! │  │ lock-free SPSC    │     │  paced worker     │                 │
//! │  └──────────────────┘     └─────────┬─────────┘                 │
//! │                                     │ AudioPacket::serialize     │
//! └─────────────────────────────────────┼────────────────────────────┘
//!                                       │ UDP datagrams
//!                                       ▼
//!                              remote receiver
//! ```
//!
//! The audio thread never allocates, locks, or performs I/O: it touches an
//! atomic streaming flag, an atomic silent-block counter, and the lock-free
//! FIFO. All lifecycle and configuration changes happen on the control
//! thread; the sender thread owns the socket.

pub mod audio;
pub mod error;
pub mod network;
pub mod protocol;
pub mod stream;

pub use audio::{AudioBlock, SampleFifo};
pub use error::{Error, Result};
pub use protocol::AudioPacket;
pub use stream::{AudioStreamManager, StreamListener, StreamState};

/// Crate-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default sample rate before `prepare` supplies the host's
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default streaming target host
    pub const DEFAULT_TARGET_HOST: &str = "127.0.0.1";

    /// Default streaming target port
    pub const DEFAULT_TARGET_PORT: u16 = 12345;

    /// Default sender pacing interval (~100 packets/sec)
    pub const DEFAULT_SEND_INTERVAL_MS: u64 = 10;

    /// FIFO capacity in samples per channel before `prepare` resizes it
    pub const DEFAULT_FIFO_CAPACITY: usize = 65_536;

    /// Audio below this peak magnitude is treated as silence (~ -60 dBFS)
    pub const SILENCE_THRESHOLD: f32 = 0.001;

    /// Consecutive silent blocks before the signal indicator drops
    pub const SILENT_BLOCK_LIMIT: u32 = 10;

    /// Seconds of audio the FIFO holds after `prepare`
    pub const FIFO_SECONDS: usize = 2;

    /// Seconds of audio carried by one packet (10 ms)
    pub const PACKET_DURATION_SECS: f64 = 0.01;

    /// How long `stop` waits for the sender thread before detaching it
    pub const STOP_GRACE: Duration = Duration::from_secs(2);
}

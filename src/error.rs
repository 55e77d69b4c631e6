//! Error types for the audio uplink

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire format errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Invalid packet magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Packet size overflow: {channels} channels x {samples} samples")]
    SizeOverflow { channels: u16, samples: u32 },

    #[error("Payload holds {actual} samples, header says {expected}")]
    PayloadMismatch { expected: usize, actual: usize },
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Stream lifecycle errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream manager has not been prepared")]
    NotPrepared,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

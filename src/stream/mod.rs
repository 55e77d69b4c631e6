//! Stream coordination: lifecycle, silence gating, sequencing

pub mod manager;

pub use manager::{AudioStreamManager, StreamListener, StreamState};

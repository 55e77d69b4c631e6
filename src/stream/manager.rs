//! Central coordinator for audio streaming
//!
//! Owns the FIFO and the sender worker, applies the silence gate on the
//! audio thread, assigns sequence numbers and timestamps on the sender
//! thread, and fans state changes out to registered listeners.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::audio::buffer::{AudioBlock, SampleFifo};
use crate::constants::{
    DEFAULT_CHANNELS, DEFAULT_FIFO_CAPACITY, DEFAULT_SAMPLE_RATE, DEFAULT_TARGET_HOST,
    DEFAULT_TARGET_PORT, FIFO_SECONDS, PACKET_DURATION_SECS, SILENCE_THRESHOLD,
    SILENT_BLOCK_LIMIT,
};
use crate::error::{Result, StreamError};
use crate::network::sender::{FillCallback, PacketSender};
use crate::network::udp::TransportFactory;
use crate::protocol::AudioPacket;

/// Connection state for the audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
    Error,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Disconnected => "Disconnected",
            StreamState::Connecting => "Connecting...",
            StreamState::Streaming => "Streaming",
            StreamState::Error => "Error",
        }
    }
}

/// Observer of stream state and statistics.
///
/// Listeners are invoked synchronously from the control thread that caused
/// the transition and must not call back into the manager.
pub trait StreamListener: Send + Sync {
    fn state_changed(&self, state: StreamState);
    fn stats_updated(&self, _packets_sent: u64, _bytes_sent: u64) {}
}

/// State shared between the control thread, the audio thread, and the
/// sender's fill callback
struct StreamCore {
    fifo: SampleFifo,
    sample_rate: AtomicU32,
    channels: AtomicUsize,
    packet_samples: AtomicUsize,
    sequence: AtomicU32,
    stream_start: Mutex<Instant>,
    streaming: AtomicBool,
    silent_blocks: AtomicU32,
}

/// Central manager for audio streaming.
///
/// Constructed once, reconfigured by [`prepare`](Self::prepare), started
/// and stopped arbitrarily many times. Dropping the manager stops the
/// stream and joins the sender thread.
pub struct AudioStreamManager {
    core: Arc<StreamCore>,
    sender: Mutex<PacketSender>,
    state: Mutex<StreamState>,
    listeners: Mutex<Vec<Arc<dyn StreamListener>>>,
    target: Mutex<(String, u16)>,
    block_size: AtomicUsize,
    prepared: AtomicBool,
}

impl AudioStreamManager {
    pub fn new() -> Self {
        Self::with_transport(crate::network::udp::UdpTransport::factory())
    }

    /// Create a manager whose sender uses `factory` for its socket
    pub fn with_transport(factory: TransportFactory) -> Self {
        let core = Arc::new(StreamCore {
            fifo: SampleFifo::new(DEFAULT_CHANNELS as usize, DEFAULT_FIFO_CAPACITY),
            sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE),
            channels: AtomicUsize::new(DEFAULT_CHANNELS as usize),
            packet_samples: AtomicUsize::new(0),
            sequence: AtomicU32::new(0),
            stream_start: Mutex::new(Instant::now()),
            streaming: AtomicBool::new(false),
            silent_blocks: AtomicU32::new(0),
        });

        let sender = PacketSender::with_transport(factory);
        sender.set_callback(Self::fill_callback(Arc::clone(&core)));

        Self {
            core,
            sender: Mutex::new(sender),
            state: Mutex::new(StreamState::Disconnected),
            listeners: Mutex::new(Vec::new()),
            target: Mutex::new((DEFAULT_TARGET_HOST.to_string(), DEFAULT_TARGET_PORT)),
            block_size: AtomicUsize::new(0),
            prepared: AtomicBool::new(false),
        }
    }

    //==========================================================================
    // Configuration
    //==========================================================================

    /// Prepare for streaming with the host's audio settings.
    ///
    /// Sizes the FIFO for two seconds of audio and derives the packet
    /// granule (10 ms of samples). Legal in any state, but callers are
    /// expected to stop first.
    pub fn prepare(&self, sample_rate: f64, block_size: usize, channels: usize) {
        let fifo_capacity = sample_rate as usize * FIFO_SECONDS;
        self.core.fifo.prepare(channels, fifo_capacity);

        let packet_samples = (sample_rate * PACKET_DURATION_SECS) as usize;
        self.core
            .sample_rate
            .store(sample_rate as u32, Ordering::Release);
        self.core.channels.store(channels, Ordering::Release);
        self.core
            .packet_samples
            .store(packet_samples, Ordering::Release);
        self.block_size.store(block_size, Ordering::Relaxed);
        self.prepared.store(true, Ordering::Release);

        tracing::debug!(
            sample_rate,
            block_size,
            channels,
            packet_samples,
            "stream manager prepared"
        );
    }

    /// Set target host and port
    pub fn set_target(&self, host: &str, port: u16) {
        *self.target.lock() = (host.to_string(), port);
        self.sender.lock().set_target(host, port);
    }

    /// Configured sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.core.sample_rate.load(Ordering::Relaxed)
    }

    /// Configured host block size
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    /// Configured channel count
    pub fn channels(&self) -> usize {
        self.core.channels.load(Ordering::Relaxed)
    }

    /// Current target host
    pub fn target_host(&self) -> String {
        self.target.lock().0.clone()
    }

    /// Current target port
    pub fn target_port(&self) -> u16 {
        self.target.lock().1
    }

    //==========================================================================
    // Streaming control
    //==========================================================================

    /// Start streaming.
    ///
    /// Resets the FIFO and sequence counter, records the stream start
    /// tick, and launches the sender. Idempotent when already streaming;
    /// fails without side effects when `prepare` has not run.
    pub fn start(&self) -> Result<()> {
        if *self.state.lock() == StreamState::Streaming {
            return Ok(());
        }
        if !self.prepared.load(Ordering::Acquire) {
            return Err(StreamError::NotPrepared.into());
        }

        self.set_state(StreamState::Connecting);

        self.core.fifo.reset();
        self.core.sequence.store(0, Ordering::Relaxed);
        *self.core.stream_start.lock() = Instant::now();

        if let Err(e) = self.sender.lock().start() {
            self.set_state(StreamState::Error);
            return Err(e.into());
        }

        self.core.streaming.store(true, Ordering::Release);
        self.set_state(StreamState::Streaming);

        let (host, port) = self.target.lock().clone();
        tracing::info!("started streaming to {host}:{port}");
        Ok(())
    }

    /// Stop streaming. Idempotent.
    pub fn stop(&self) {
        self.core.streaming.store(false, Ordering::Release);
        self.sender.lock().stop();
        self.core.fifo.reset();
        self.set_state(StreamState::Disconnected);

        tracing::info!("stopped streaming");
    }

    /// Whether the stream is currently running
    pub fn is_streaming(&self) -> bool {
        self.core.streaming.load(Ordering::Relaxed)
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Human-readable state name
    pub fn state_string(&self) -> &'static str {
        self.state().as_str()
    }

    //==========================================================================
    // Audio thread interface
    //==========================================================================

    /// Push one block from the host's audio callback.
    ///
    /// Real-time safe: no allocation, no locks, no I/O. Blocks whose peak
    /// magnitude stays below the silence threshold are dropped and counted
    /// toward the silent-block hysteresis.
    pub fn push_audio(&self, block: &AudioBlock) {
        if !self.core.streaming.load(Ordering::Relaxed) {
            return;
        }

        if block.magnitude() < SILENCE_THRESHOLD {
            self.core.silent_blocks.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.core.silent_blocks.store(0, Ordering::Relaxed);
        self.core.fifo.push(block);
    }

    /// Whether recent blocks carried audible signal
    pub fn has_audio_signal(&self) -> bool {
        self.core.silent_blocks.load(Ordering::Relaxed) < SILENT_BLOCK_LIMIT
    }

    //==========================================================================
    // Statistics
    //==========================================================================

    pub fn packets_sent(&self) -> u64 {
        self.sender.lock().packets_sent()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sender.lock().bytes_sent()
    }

    pub fn fifo_level(&self) -> usize {
        self.core.fifo.ready()
    }

    pub fn fifo_overruns(&self) -> u64 {
        self.core.fifo.overruns()
    }

    pub fn fifo_underruns(&self) -> u64 {
        self.core.fifo.underruns()
    }

    /// Last error recorded by the sender, empty when none
    pub fn last_error(&self) -> String {
        self.sender.lock().last_error()
    }

    //==========================================================================
    // Listener management
    //==========================================================================

    pub fn add_listener(&self, listener: Arc<dyn StreamListener>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn StreamListener>) {
        self.listeners
            .lock()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Fan current packet/byte counters out to listeners
    pub fn publish_stats(&self) {
        let packets = self.packets_sent();
        let bytes = self.bytes_sent();
        for listener in self.listeners.lock().iter() {
            listener.stats_updated(packets, bytes);
        }
    }

    //==========================================================================
    // Internals
    //==========================================================================

    fn set_state(&self, new_state: StreamState) {
        {
            let mut state = self.state.lock();
            if *state == new_state {
                return;
            }
            *state = new_state;
        }

        for listener in self.listeners.lock().iter() {
            listener.state_changed(new_state);
        }
    }

    /// Build the callback the sender invokes each tick.
    ///
    /// Runs on the sender thread; the scratch buffer is reused across
    /// ticks and only reallocated when `prepare` changes the shape.
    fn fill_callback(core: Arc<StreamCore>) -> FillCallback {
        let mut scratch: Vec<Vec<f32>> = Vec::new();

        Box::new(move |packet: &mut AudioPacket| {
            let samples = core.packet_samples.load(Ordering::Acquire);
            let channels = core.channels.load(Ordering::Acquire);
            if samples == 0 || channels == 0 {
                return false;
            }
            if core.fifo.ready() < samples {
                return false;
            }

            if scratch.len() != channels || scratch.iter().any(|ch| ch.len() < samples) {
                scratch = vec![vec![0.0; samples]; channels];
            }
            if !core.fifo.pop(&mut scratch, samples) {
                return false;
            }

            let planar: Vec<&[f32]> = scratch.iter().map(|ch| &ch[..samples]).collect();
            packet.set_from_channels(&planar, samples, core.sample_rate.load(Ordering::Relaxed));
            packet.timestamp_us = core.stream_start.lock().elapsed().as_micros() as u64;
            packet.sequence = core.sequence.fetch_add(1, Ordering::Relaxed);
            true
        })
    }
}

impl Default for AudioStreamManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioStreamManager {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Paced UDP packet sender
//!
//! A worker thread that pulls packets from a fill callback at a fixed
//! interval, serializes them, and transmits them to the configured target.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::constants::{
    DEFAULT_SEND_INTERVAL_MS, DEFAULT_TARGET_HOST, DEFAULT_TARGET_PORT, STOP_GRACE,
};
use crate::error::NetworkError;
use crate::network::udp::{DatagramSocket, TransportFactory, UdpTransport};
use crate::protocol::AudioPacket;

/// Callback that fills the next packet to send.
///
/// Returns false when no data is ready; the tick is skipped.
pub type FillCallback = Box<dyn FnMut(&mut AudioPacket) -> bool + Send>;

/// Target address and diagnostics, shared with the worker thread
struct SenderSettings {
    target_host: String,
    target_port: u16,
    last_error: String,
}

/// Sender worker owning the datagram socket.
///
/// `packets_sent`/`bytes_sent` are cumulative for the sender's lifetime;
/// they are not reset by `stop`/`start` cycles.
pub struct PacketSender {
    settings: Arc<Mutex<SenderSettings>>,
    callback: Arc<Mutex<Option<FillCallback>>>,
    interval_ms: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    packets_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    factory: TransportFactory,
    error_rx: Option<Receiver<NetworkError>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PacketSender {
    pub fn new() -> Self {
        Self::with_transport(UdpTransport::factory())
    }

    /// Create a sender whose socket comes from `factory` on each `start`
    pub fn with_transport(factory: TransportFactory) -> Self {
        Self {
            settings: Arc::new(Mutex::new(SenderSettings {
                target_host: DEFAULT_TARGET_HOST.to_string(),
                target_port: DEFAULT_TARGET_PORT,
                last_error: String::new(),
            })),
            callback: Arc::new(Mutex::new(None)),
            interval_ms: Arc::new(AtomicU64::new(DEFAULT_SEND_INTERVAL_MS)),
            shutdown: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            packets_sent: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            factory,
            error_rx: None,
            thread_handle: None,
        }
    }

    /// Configure target address and port
    pub fn set_target(&self, host: &str, port: u16) {
        let mut settings = self.settings.lock();
        settings.target_host = host.to_string();
        settings.target_port = port;
    }

    /// Set the callback that provides packets; call before `start`
    pub fn set_callback(&self, callback: FillCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Set the pacing interval; takes effect on the next tick
    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.interval_ms.store(interval_ms, Ordering::Relaxed);
    }

    /// Start the sender thread.
    ///
    /// Binds a fresh socket through the transport factory; a bind failure
    /// is recorded as the last error and returned. Idempotent when the
    /// worker is already running.
    pub fn start(&mut self) -> Result<(), NetworkError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.store(false, Ordering::SeqCst);

        let socket = match (self.factory)() {
            Ok(socket) => socket,
            Err(e) => {
                self.settings.lock().last_error = e.to_string();
                tracing::error!("failed to bind sender socket: {e}");
                return Err(e);
            }
        };

        let (error_tx, error_rx) = bounded::<NetworkError>(16);
        self.error_rx = Some(error_rx);

        let settings = Arc::clone(&self.settings);
        let callback = Arc::clone(&self.callback);
        let interval_ms = Arc::clone(&self.interval_ms);
        let shutdown = Arc::clone(&self.shutdown);
        let running = Arc::clone(&self.running);
        let packets_sent = Arc::clone(&self.packets_sent);
        let bytes_sent = Arc::clone(&self.bytes_sent);

        self.running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("uplink-sender".to_string())
            .spawn(move || {
                run_loop(
                    socket,
                    callback,
                    settings,
                    interval_ms,
                    &shutdown,
                    packets_sent,
                    bytes_sent,
                    error_tx,
                );
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                NetworkError::BindFailed(format!("failed to spawn thread: {e}"))
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop the sender thread.
    ///
    /// Signals shutdown and joins within the grace period; a worker that
    /// does not exit in time is detached and its socket closes when the
    /// thread finally ends. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle.thread().unpark();

            let deadline = Instant::now() + STOP_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }

            if handle.is_finished() {
                let _ = handle.join();
            } else {
                tracing::warn!("sender thread did not exit within grace period, detaching");
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the worker is running and not shutting down
    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Total packets transmitted
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Total bytes transmitted
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Last recorded error message, empty when none
    pub fn last_error(&self) -> String {
        self.settings.lock().last_error.clone()
    }

    /// Drain one error reported by the worker thread, if any
    pub fn check_errors(&self) -> Option<NetworkError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Default for PacketSender {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PacketSender {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    socket: Box<dyn DatagramSocket>,
    callback: Arc<Mutex<Option<FillCallback>>>,
    settings: Arc<Mutex<SenderSettings>>,
    interval_ms: Arc<AtomicU64>,
    shutdown: &AtomicBool,
    packets_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    error_tx: Sender<NetworkError>,
) {
    tracing::debug!("sender thread started");

    while !shutdown.load(Ordering::SeqCst) {
        let mut packet = AudioPacket::default();
        let filled = {
            let mut callback = callback.lock();
            callback.as_mut().is_some_and(|cb| cb(&mut packet))
        };

        if filled {
            match packet.serialize() {
                Ok(data) => {
                    let (host, port) = {
                        let settings = settings.lock();
                        (settings.target_host.clone(), settings.target_port)
                    };

                    match socket.send_to(&data, &host, port) {
                        Ok(sent) => {
                            packets_sent.fetch_add(1, Ordering::Relaxed);
                            bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                        }
                        Err(e) => {
                            // Transient network failures are non-fatal.
                            settings.lock().last_error = e.to_string();
                            tracing::warn!("send failed: {e}");
                            let _ = error_tx.try_send(e);
                        }
                    }
                }
                Err(e) => tracing::warn!("packet serialization failed: {e}"),
            }
        }

        let interval = interval_ms.load(Ordering::Relaxed);
        if interval > 0 {
            thread::park_timeout(Duration::from_millis(interval));
        }
    }

    tracing::debug!("sender thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use std::sync::Arc;

    struct MockSocket {
        sent: Arc<Mutex<Vec<(String, u16, Vec<u8>)>>>,
        fail_sends: bool,
    }

    impl DatagramSocket for MockSocket {
        fn send_to(&self, payload: &[u8], host: &str, port: u16) -> Result<usize, NetworkError> {
            if self.fail_sends {
                return Err(NetworkError::SendFailed("mock failure".to_string()));
            }
            self.sent
                .lock()
                .push((host.to_string(), port, payload.to_vec()));
            Ok(payload.len())
        }
    }

    fn mock_factory(
        sent: Arc<Mutex<Vec<(String, u16, Vec<u8>)>>>,
        fail_sends: bool,
    ) -> TransportFactory {
        Arc::new(move || {
            Ok(Box::new(MockSocket {
                sent: Arc::clone(&sent),
                fail_sends,
            }) as Box<dyn DatagramSocket>)
        })
    }

    fn counting_callback() -> FillCallback {
        let mut sequence = 0u32;
        Box::new(move |packet: &mut AudioPacket| {
            let samples = [0.1f32, 0.2, 0.3, 0.4];
            packet.set_from_channels(&[&samples[..]], 4, 8_000);
            packet.sequence = sequence;
            sequence += 1;
            true
        })
    }

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for sender");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_sends_packets_and_counts() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sender = PacketSender::with_transport(mock_factory(Arc::clone(&sent), false));
        sender.set_callback(counting_callback());
        sender.set_target("10.0.0.1", 9999);
        sender.set_interval_ms(1);

        sender.start().unwrap();
        wait_for(|| sender.packets_sent() >= 3);
        sender.stop();

        let sent = sent.lock();
        assert!(sent.len() >= 3);
        let total_bytes: u64 = sent.iter().map(|(_, _, data)| data.len() as u64).sum();
        assert_eq!(sender.packets_sent(), sent.len() as u64);
        assert_eq!(sender.bytes_sent(), total_bytes);

        for (host, port, data) in sent.iter() {
            assert_eq!(host, "10.0.0.1");
            assert_eq!(*port, 9999);
            let packet = AudioPacket::deserialize(data).unwrap();
            assert_eq!(packet.channels, 1);
            assert_eq!(packet.samples, 4);
        }
    }

    #[test]
    fn test_start_is_idempotent() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sender = PacketSender::with_transport(mock_factory(sent, false));
        sender.set_callback(counting_callback());

        sender.start().unwrap();
        assert!(sender.is_active());
        sender.start().unwrap();
        assert!(sender.is_active());

        sender.stop();
        assert!(!sender.is_active());
        sender.stop();
        assert!(!sender.is_active());
    }

    #[test]
    fn test_bind_failure_records_error() {
        let factory: TransportFactory =
            Arc::new(|| Err(NetworkError::BindFailed("mock bind failure".to_string())));
        let mut sender = PacketSender::with_transport(factory);
        sender.set_callback(counting_callback());

        let err = sender.start().unwrap_err();
        assert!(matches!(err, NetworkError::BindFailed(_)));
        assert!(!sender.is_active());
        assert!(!sender.last_error().is_empty());
        assert_eq!(sender.packets_sent(), 0);
    }

    #[test]
    fn test_send_failure_is_non_fatal() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sender = PacketSender::with_transport(mock_factory(sent, true));
        sender.set_callback(counting_callback());
        sender.set_interval_ms(1);

        sender.start().unwrap();
        wait_for(|| sender.check_errors().is_some());

        // The loop keeps running after failed sends.
        assert!(sender.is_active());
        assert_eq!(sender.packets_sent(), 0);
        assert!(!sender.last_error().is_empty());
        sender.stop();
    }

    #[test]
    fn test_counters_cumulative_across_restart() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sender = PacketSender::with_transport(mock_factory(sent, false));
        sender.set_callback(counting_callback());
        sender.set_interval_ms(1);

        sender.start().unwrap();
        wait_for(|| sender.packets_sent() >= 2);
        sender.stop();
        let after_first_run = sender.packets_sent();

        sender.start().unwrap();
        wait_for(|| sender.packets_sent() > after_first_run);
        sender.stop();
    }

    #[test]
    fn test_skips_tick_when_callback_has_no_data() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sender = PacketSender::with_transport(mock_factory(Arc::clone(&sent), false));
        sender.set_callback(Box::new(|_| false));
        sender.set_interval_ms(1);

        sender.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        sender.stop();

        assert_eq!(sender.packets_sent(), 0);
        assert!(sent.lock().is_empty());
    }
}

//! Demo Sender
//!
//! Synthesizes a sine wave at real-time block rate and streams it over UDP
//! through the stream manager, the way a plug-in host would feed it.

use anyhow::Result;
use std::f32::consts::TAU;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_uplink::constants::{DEFAULT_TARGET_HOST, DEFAULT_TARGET_PORT};
use audio_uplink::{AudioBlock, AudioStreamManager};

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK_SIZE: usize = 480;
const TONE_HZ: f32 = 440.0;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| DEFAULT_TARGET_HOST.to_string());
    let port: u16 = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_TARGET_PORT,
    };

    let manager = AudioStreamManager::new();
    manager.prepare(SAMPLE_RATE, BLOCK_SIZE, 2);
    manager.set_target(&host, port);
    manager.start()?;

    tracing::info!("streaming {TONE_HZ} Hz sine to {host}:{port} - press Ctrl+C to stop");

    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    let mut phase = 0.0f32;
    let phase_step = TAU * TONE_HZ / SAMPLE_RATE as f32;
    let block_period = Duration::from_secs_f64(BLOCK_SIZE as f64 / SAMPLE_RATE);
    let mut next_block = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        for i in 0..BLOCK_SIZE {
            let sample = 0.5 * phase.sin();
            left[i] = sample;
            right[i] = sample;
            phase += phase_step;
            if phase > TAU {
                phase -= TAU;
            }
        }

        let channels: [&[f32]; 2] = [&left, &right];
        manager.push_audio(&AudioBlock::new(&channels));

        next_block += block_period;
        if let Some(wait) = next_block.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }

        if last_stats.elapsed() >= Duration::from_secs(1) {
            last_stats = Instant::now();
            manager.publish_stats();
            tracing::info!(
                packets = manager.packets_sent(),
                kb_sent = manager.bytes_sent() / 1024,
                fifo_level = manager.fifo_level(),
                overruns = manager.fifo_overruns(),
                underruns = manager.fifo_underruns(),
                "stats"
            );
        }
    }
}

//! Level meter example.
//!
//! Prints the peak level of each channel a few times per second from the
//! chosen input device.
//!
//! Run with: cargo run --example level_meter -- [device] [channels] [seconds]
//!
//! `device` is a name, an index from `list_devices`, or `default`.

#![allow(clippy::print_stdout)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audio_listen::{DeviceId, InputStream, StreamConfig};
use tracing_subscriber::EnvFilter;

const MAX_METERED_CHANNELS: usize = 8;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let device: DeviceId = args.next().unwrap_or_else(|| "default".to_string()).parse()?;
    let channels: u16 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(1);
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5);

    // Peaks are stored as f32 bits so the audio thread never locks
    let peaks: Arc<Vec<AtomicU32>> = Arc::new(
        (0..MAX_METERED_CHANNELS)
            .map(|_| AtomicU32::new(0))
            .collect(),
    );
    let meter = Arc::clone(&peaks);

    let stream = InputStream::open(
        StreamConfig::new(device).channels(channels),
        move |block, _frames, _timing| {
            for (channel, peak) in meter.iter().enumerate().take(block.channels() as usize) {
                let block_peak = block
                    .channel(channel as u16)
                    .fold(0.0f32, |m, s| m.max(s.abs()));
                let current = f32::from_bits(peak.load(Ordering::Relaxed));
                if block_peak > current {
                    peak.store(block_peak.to_bits(), Ordering::Relaxed);
                }
            }
        },
    )?;

    let shown = (channels as usize).min(MAX_METERED_CHANNELS);
    let stats = stream.run(|stream| {
        let ticks = seconds * 4;
        for _ in 0..ticks {
            std::thread::sleep(Duration::from_millis(250));
            let line: Vec<String> = peaks
                .iter()
                .take(shown)
                .map(|p| {
                    let peak = f32::from_bits(p.swap(0, Ordering::Relaxed));
                    let bars = (peak * 40.0).round() as usize;
                    format!("{:<40} {peak:.3}", "#".repeat(bars.min(40)))
                })
                .collect();
            println!("{}", line.join(" | "));
        }
        stream.stats()
    })?;

    println!("Stats: {stats:?}");
    Ok(())
}

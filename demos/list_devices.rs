//! Lists input devices on the default audio host.
//!
//! Run with: cargo run --example list_devices

#![allow(clippy::print_stdout)]

use audio_listen::list_input_devices;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    for device in list_input_devices()? {
        let marker = if device.is_default_input { "*" } else { " " };
        println!(
            "{marker} {:>2}  {}  ({} ch max, default {} Hz / {} ch)",
            device.index,
            device.name,
            device.max_input_channels,
            device.default_sample_rate,
            device.default_channels
        );
    }

    Ok(())
}

//! Mock audio backend for testing without hardware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{AudioBackend, DeviceInfo, NativeStream, StreamParams};
use crate::callback::BlockHandler;
use crate::{BlockTiming, CallbackStatus, ListenError};

/// A device exposed by [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    max_input_channels: u16,
    default_channels: u16,
    default_sample_rate: u32,
    supported_rates: Option<Vec<u32>>,
}

impl MockDevice {
    /// An input device with the given default rate and channel count.
    pub fn input(name: impl Into<String>, default_sample_rate: u32, channels: u16) -> Self {
        Self {
            name: name.into(),
            max_input_channels: channels,
            default_channels: channels,
            default_sample_rate,
            supported_rates: None,
        }
    }

    /// An output-only device, which never resolves as an input.
    pub fn output(name: impl Into<String>, default_sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            max_input_channels: 0,
            default_channels: 2,
            default_sample_rate,
            supported_rates: None,
        }
    }

    /// Restricts the sample rates the device accepts when opening a stream.
    #[must_use]
    pub fn with_supported_rates(mut self, rates: Vec<u32>) -> Self {
        self.supported_rates = Some(rates);
        self
    }

    fn info(&self, index: usize, is_default_input: bool) -> DeviceInfo {
        DeviceInfo {
            index,
            name: self.name.clone(),
            max_input_channels: self.max_input_channels,
            default_channels: self.default_channels,
            default_sample_rate: self.default_sample_rate,
            is_default_input,
        }
    }
}

/// One open mock stream.
struct Slot {
    id: u64,
    handler: BlockHandler,
    params: StreamParams,
    running: bool,
    block_index: u64,
    frame_position: u64,
    scratch: Vec<f32>,
}

impl Slot {
    fn deliver(&mut self, samples: Option<&[f32]>, status: CallbackStatus) {
        let samples = match samples {
            Some(samples) => samples,
            None => &self.scratch,
        };
        let channels = u64::from(self.params.channels.max(1));
        let frames = samples.len() as u64 / channels;
        let timing = BlockTiming {
            block_index: self.block_index,
            frame_position: self.frame_position,
            callback_time: Duration::from_secs_f64(
                self.frame_position as f64 / f64::from(self.params.sample_rate),
            ),
            capture_latency: None,
        };
        (self.handler)(samples, timing, status);
        self.block_index += 1;
        self.frame_position += frames;
    }
}

#[derive(Default)]
struct MockShared {
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
    opened_total: AtomicU64,
}

impl MockShared {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A test double for the native audio subsystem.
///
/// Devices are configured up front; blocks are injected through a
/// [`MockDriver`], synchronously on the calling thread. Delivery and stream
/// close share one lock, so no block reaches a handler after its stream has
/// been dropped.
///
/// # Example
///
/// ```
/// use audio_listen::{InputStream, MockBackend, MockDevice, StreamConfig};
///
/// let backend = MockBackend::new()
///     .with_device(MockDevice::input("Test Mic", 48_000, 1))
///     .with_default(0);
/// let driver = backend.driver();
///
/// let mut stream = InputStream::open_with(&backend, StreamConfig::default(), |block, frames, _| {
///     assert_eq!(block.frames(), frames);
/// })
/// .unwrap();
///
/// stream.start().unwrap();
/// assert!(driver.deliver_silence(256));
/// stream.close();
/// assert!(!driver.deliver_silence(256));
/// ```
#[must_use]
pub struct MockBackend {
    devices: Vec<MockDevice>,
    default_input: Option<usize>,
    open_error: Option<String>,
    stop_error: Option<String>,
    shared: Arc<MockShared>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates a backend with no devices.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            default_input: None,
            open_error: None,
            stop_error: None,
            shared: Arc::new(MockShared::default()),
        }
    }

    /// Creates a backend with one default input device named `"Mock Input"`.
    pub fn with_default_input(sample_rate: u32, channels: u16) -> Self {
        Self::new()
            .with_device(MockDevice::input("Mock Input", sample_rate, channels))
            .with_default(0)
    }

    /// Adds a device; its index is its position in insertion order.
    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Marks the device at `index` as the default input.
    pub fn with_default(mut self, index: usize) -> Self {
        self.default_input = Some(index);
        self
    }

    /// Makes every `open_input` call fail with the given reason.
    pub fn fail_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// Makes `stop` fail with the given reason on every stream opened afterwards.
    ///
    /// The stream keeps running, as a driver whose pause call failed would.
    pub fn fail_stop(mut self, reason: impl Into<String>) -> Self {
        self.stop_error = Some(reason.into());
        self
    }

    /// Returns a handle for injecting blocks.
    pub fn driver(&self) -> MockDriver {
        MockDriver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of streams currently open.
    pub fn open_streams(&self) -> usize {
        self.shared.slots().len()
    }

    /// Number of streams successfully opened over the backend's lifetime.
    pub fn opened_total(&self) -> u64 {
        self.shared.opened_total.load(Ordering::SeqCst)
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, ListenError> {
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, d)| d.info(index, self.default_input == Some(index)))
            .collect())
    }

    fn default_input_device(&self) -> Result<Option<DeviceInfo>, ListenError> {
        Ok(self
            .default_input
            .and_then(|index| self.devices.get(index).map(|d| d.info(index, true)))
            .filter(DeviceInfo::is_input))
    }

    fn open_input(
        &self,
        device: &DeviceInfo,
        params: &StreamParams,
        handler: BlockHandler,
    ) -> Result<Box<dyn NativeStream>, ListenError> {
        if let Some(reason) = &self.open_error {
            return Err(ListenError::stream_open(&device.name, reason));
        }

        let mock = self
            .devices
            .get(device.index)
            .ok_or_else(|| ListenError::stream_open(&device.name, "device disappeared"))?;

        if params.channels > mock.max_input_channels {
            return Err(ListenError::stream_open(
                &device.name,
                format!(
                    "{} channels requested, device supports {}",
                    params.channels, mock.max_input_channels
                ),
            ));
        }
        if let Some(rates) = &mock.supported_rates {
            if !rates.contains(&params.sample_rate) {
                return Err(ListenError::stream_open(
                    &device.name,
                    format!("sample rate {}Hz not supported", params.sample_rate),
                ));
            }
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.slots().push(Slot {
            id,
            handler,
            params: *params,
            running: false,
            block_index: 0,
            frame_position: 0,
            scratch: Vec::new(),
        });
        self.shared.opened_total.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockStream {
            id,
            stop_error: self.stop_error.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockStream {
    id: u64,
    stop_error: Option<String>,
    shared: Arc<MockShared>,
}

impl MockStream {
    fn set_running(&self, running: bool) -> Result<(), ListenError> {
        let mut slots = self.shared.slots();
        let slot = slots
            .iter_mut()
            .find(|s| s.id == self.id)
            .ok_or_else(|| ListenError::Backend("mock stream no longer open".to_string()))?;
        slot.running = running;
        Ok(())
    }
}

impl NativeStream for MockStream {
    fn start(&mut self) -> Result<(), ListenError> {
        self.set_running(true)
    }

    fn stop(&mut self) -> Result<(), ListenError> {
        if let Some(reason) = &self.stop_error {
            return Err(ListenError::Backend(reason.clone()));
        }
        self.set_running(false)
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.shared.slots().retain(|s| s.id != self.id);
    }
}

/// Injects synthetic blocks into the streams of a [`MockBackend`].
///
/// Every `deliver*` call hands one block to each started stream and returns
/// `true` if at least one stream received it.
#[derive(Clone)]
pub struct MockDriver {
    shared: Arc<MockShared>,
}

impl MockDriver {
    /// Delivers interleaved samples as-is.
    pub fn deliver(&self, samples: &[f32], status: CallbackStatus) -> bool {
        let mut delivered = false;
        for slot in self.shared.slots().iter_mut().filter(|s| s.running) {
            slot.deliver(Some(samples), status);
            delivered = true;
        }
        delivered
    }

    /// Delivers `frames` frames of silence.
    pub fn deliver_silence(&self, frames: usize) -> bool {
        self.deliver_generated(frames, CallbackStatus::EMPTY, |_, _| 0.0)
    }

    /// Delivers `frames` frames of silence with a driver status.
    pub fn deliver_status(&self, frames: usize, status: CallbackStatus) -> bool {
        self.deliver_generated(frames, status, |_, _| 0.0)
    }

    /// Delivers a sine wave, continuous across blocks, on every channel.
    pub fn deliver_sine(&self, frequency: f64, amplitude: f32, frames: usize) -> bool {
        self.deliver_generated(frames, CallbackStatus::EMPTY, |position, sample_rate| {
            let t = position as f64 / f64::from(sample_rate);
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32 * amplitude
        })
    }

    /// Delivers deterministic white noise in `[-amplitude, amplitude]`.
    pub fn deliver_noise(&self, amplitude: f32, frames: usize) -> bool {
        self.deliver_generated(frames, CallbackStatus::EMPTY, |position, _| {
            // Simple LCG seeded by frame position
            let seed = (position as u32)
                .wrapping_mul(1_103_515_245)
                .wrapping_add(12345);
            let unit = f32::from((seed >> 16) as u16) / f32::from(u16::MAX);
            (unit * 2.0 - 1.0) * amplitude
        })
    }

    fn deliver_generated(
        &self,
        frames: usize,
        status: CallbackStatus,
        generate: impl Fn(u64, u32) -> f32,
    ) -> bool {
        let mut delivered = false;
        for slot in self.shared.slots().iter_mut().filter(|s| s.running) {
            let channels = slot.params.channels as usize;
            slot.scratch.clear();
            for i in 0..frames {
                let value = generate(slot.frame_position + i as u64, slot.params.sample_rate);
                slot.scratch.extend(std::iter::repeat(value).take(channels));
            }
            slot.deliver(None, status);
            delivered = true;
        }
        delivered
    }
}

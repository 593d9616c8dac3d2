//! The native audio layer as a capability boundary.
//!
//! [`AudioBackend`] covers everything the stream handle needs from a driver:
//! device enumeration, default device lookup, and opening an input stream
//! bound to a [`BlockHandler`]. [`CpalBackend`] talks to real hardware;
//! [`MockBackend`] injects synthetic blocks for tests.

mod cpal_backend;
mod mock;

pub use self::cpal_backend::{default_input_device, list_input_devices, CpalBackend};
pub use self::mock::{MockBackend, MockDevice, MockDriver};

use crate::callback::BlockHandler;
use crate::{DeviceId, ListenError};

/// Description of an audio device as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position of the device in the backend's enumeration.
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Maximum number of input channels (0 for output-only devices).
    pub max_input_channels: u16,
    /// Channel count of the device's default input configuration.
    pub default_channels: u16,
    /// Sample rate of the device's default input configuration, in Hz.
    pub default_sample_rate: u32,
    /// Whether this is the system's default input device.
    pub is_default_input: bool,
}

impl DeviceInfo {
    /// Returns `true` if the device can capture audio.
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }
}

/// Resolved parameters passed to [`AudioBackend::open_input()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Channels to capture.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block, or `None` for the driver's choice.
    pub block_size: Option<u32>,
}

/// A native input stream owned by an [`InputStream`](crate::InputStream).
///
/// Implementations stop delivering blocks and release driver resources when
/// dropped. After `drop` returns, the handler is never invoked again.
pub trait NativeStream {
    /// Begins (or resumes) delivery of blocks to the handler.
    fn start(&mut self) -> Result<(), ListenError>;

    /// Pauses delivery without releasing the device.
    fn stop(&mut self) -> Result<(), ListenError>;
}

/// Access to a native audio subsystem.
pub trait AudioBackend {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Enumerates all devices. `DeviceInfo::index` is the position in this list.
    fn devices(&self) -> Result<Vec<DeviceInfo>, ListenError>;

    /// Returns the system's default input device, if any.
    fn default_input_device(&self) -> Result<Option<DeviceInfo>, ListenError>;

    /// Opens an input stream on `device` without starting it.
    ///
    /// # Errors
    ///
    /// Returns [`ListenError::StreamOpen`] if the device rejects the parameters.
    fn open_input(
        &self,
        device: &DeviceInfo,
        params: &StreamParams,
        handler: BlockHandler,
    ) -> Result<Box<dyn NativeStream>, ListenError>;
}

/// Resolves a [`DeviceId`] to an input-capable device.
///
/// Names match exactly first, then by unique case-insensitive substring.
///
/// # Errors
///
/// Returns [`ListenError::DeviceNotFound`] when nothing matches,
/// [`ListenError::AmbiguousDevice`] when a substring matches several devices,
/// and [`ListenError::NoDefaultDevice`] when no default input exists.
pub fn resolve_device<B>(backend: &B, id: &DeviceId) -> Result<DeviceInfo, ListenError>
where
    B: AudioBackend + ?Sized,
{
    match id {
        DeviceId::Default => backend
            .default_input_device()?
            .ok_or(ListenError::NoDefaultDevice),
        DeviceId::Index(index) => backend
            .devices()?
            .into_iter()
            .find(|d| d.index == *index && d.is_input())
            .ok_or_else(|| ListenError::DeviceNotFound {
                device: id.to_string(),
            }),
        DeviceId::Name(name) => {
            let inputs: Vec<DeviceInfo> =
                backend.devices()?.into_iter().filter(DeviceInfo::is_input).collect();

            if let Some(exact) = inputs.iter().find(|d| d.name == *name) {
                return Ok(exact.clone());
            }

            let needle = name.to_lowercase();
            let mut matches: Vec<DeviceInfo> = inputs
                .into_iter()
                .filter(|d| d.name.to_lowercase().contains(&needle))
                .collect();

            match matches.len() {
                0 => Err(ListenError::DeviceNotFound {
                    device: name.clone(),
                }),
                1 => Ok(matches.remove(0)),
                _ => Err(ListenError::AmbiguousDevice {
                    device: name.clone(),
                    matches: matches.into_iter().map(|d| d.name).collect(),
                }),
            }
        }
    }
}

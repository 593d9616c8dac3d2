//! Configuration types for input streams.

use std::fmt;
use std::str::FromStr;

use crate::ListenError;

/// Identifies which input device to open.
///
/// Parsing accepts `"default"` (any case), a decimal device index, or any
/// other string as a device name.
///
/// # Example
///
/// ```
/// use audio_listen::DeviceId;
///
/// assert_eq!("default".parse::<DeviceId>().unwrap(), DeviceId::Default);
/// assert_eq!("3".parse::<DeviceId>().unwrap(), DeviceId::Index(3));
/// assert_eq!(
///     "USB Mic".parse::<DeviceId>().unwrap(),
///     DeviceId::Name("USB Mic".to_string())
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeviceId {
    /// The system's default input device.
    #[default]
    Default,
    /// A device matched by name (exact, then unique case-insensitive substring).
    Name(String),
    /// A device by its position in the backend's device enumeration.
    Index(usize),
}

impl DeviceId {
    /// Creates a name identifier, mapping `"default"` to [`DeviceId::Default`].
    pub fn name(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("default") {
            Self::Default
        } else {
            Self::Name(name)
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Name(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::name(trimmed),
        })
    }
}

/// Treats the string as a device name, so `"3"` becomes `Name("3")`.
///
/// Use [`str::parse`] to accept indices from user input, or
/// `DeviceId::Index` / `From<usize>` directly.
impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::name(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::name(s)
    }
}

impl From<usize> for DeviceId {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Parameters for opening an [`InputStream`](crate::InputStream).
///
/// Use [`StreamConfig::default()`] for the default device in mono at the
/// device's own sample rate, and adjust with the builder-style setters.
///
/// # Example
///
/// ```
/// use audio_listen::{DeviceId, StreamConfig};
///
/// let config = StreamConfig::new("USB Mic")
///     .channels(2)
///     .sample_rate(44_100);
///
/// assert_eq!(config.device, DeviceId::Name("USB Mic".to_string()));
/// assert_eq!(config.channels, 2);
/// assert_eq!(config.sample_rate, Some(44_100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Which device to open.
    pub device: DeviceId,

    /// Number of input channels to capture.
    ///
    /// Default: 1
    pub channels: u16,

    /// Sample rate override in Hz.
    ///
    /// `None` uses the device's reported default sample rate.
    pub sample_rate: Option<u32>,

    /// Frames per block requested from the driver.
    ///
    /// `None` lets the driver choose; block sizes may then vary between callbacks.
    pub block_size: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::Default,
            channels: 1,
            sample_rate: None,
            block_size: None,
        }
    }
}

impl StreamConfig {
    /// Creates a mono configuration for the given device.
    pub fn new(device: impl Into<DeviceId>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Sets the channel count.
    #[must_use]
    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Overrides the device's default sample rate.
    #[must_use]
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Requests a fixed number of frames per block.
    #[must_use]
    pub fn block_size(mut self, frames: u32) -> Self {
        self.block_size = Some(frames);
        self
    }

    /// Checks the values that can be rejected without touching a device.
    pub fn validate(&self) -> Result<(), ListenError> {
        if self.channels == 0 {
            return Err(ListenError::invalid_config("channels must be at least 1"));
        }
        if self.sample_rate == Some(0) {
            return Err(ListenError::invalid_config(
                "sample rate override must be positive",
            ));
        }
        if self.block_size == Some(0) {
            return Err(ListenError::invalid_config("block size must be positive"));
        }
        Ok(())
    }
}

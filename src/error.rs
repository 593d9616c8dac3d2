//! Error types for audio-listen.
//!
//! Only failures that prevent a stream from being opened or controlled are
//! errors. Driver status warnings and panics inside the user callback are
//! logged from the audio thread and never surface here.

/// Fatal errors returned while opening or controlling an [`InputStream`].
///
/// [`InputStream`]: crate::InputStream
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    /// No input-capable device matches the identifier.
    #[error("device not found: {device}")]
    DeviceNotFound {
        /// The identifier that failed to resolve.
        device: String,
    },

    /// A device name matched more than one input device.
    #[error("device name '{device}' is ambiguous (matches: {})", matches.join(", "))]
    AmbiguousDevice {
        /// The name that was looked up.
        device: String,
        /// Names of every matching device.
        matches: Vec<String>,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultDevice,

    /// The stream configuration is invalid before any device is touched.
    #[error("invalid stream configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The native audio layer rejected the requested stream parameters.
    #[error("failed to open input stream on '{device}': {reason}")]
    StreamOpen {
        /// Name of the device the stream was opened on.
        device: String,
        /// Reason reported by the audio backend.
        reason: String,
    },

    /// The stream was used after `close()`.
    #[error("stream is closed")]
    StreamClosed,

    /// An error from the underlying audio library.
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl ListenError {
    /// Creates an [`InvalidConfig`](Self::InvalidConfig) error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Creates a [`StreamOpen`](Self::StreamOpen) error.
    pub fn stream_open(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::StreamOpen {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for errors raised while resolving the device identifier.
    pub fn is_device_resolution(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. } | Self::AmbiguousDevice { .. } | Self::NoDefaultDevice
        )
    }
}

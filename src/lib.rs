//! # audio-listen
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! A thin handle over a native audio input stream.
//!
//! `audio-listen` opens an input stream on a named, indexed or default device
//! and hands every block the driver captures to your callback, together with
//! the frame count and timing metadata. It does no buffering, resampling or
//! signal processing of its own.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use audio_listen::{InputStream, StreamConfig};
//!
//! let mut stream = InputStream::open(
//!     StreamConfig::new("default").channels(1),
//!     |block, frames, timing| {
//!         // Runs on the driver's real-time thread: keep it short
//!         let peak = block.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
//!         tracing::trace!(frames, block = timing.block_index, peak);
//!     },
//! )?;
//!
//! {
//!     let _active = stream.start_scoped()?;
//!     std::thread::sleep(std::time::Duration::from_secs(5));
//! } // stream closed here
//! ```
//!
//! ## Architecture
//!
//! There are two threads involved:
//!
//! - **Owning thread**: opens the stream and issues `start`/`stop`/`close`
//! - **Driver thread**: owned by the audio backend, invokes the callback per block
//!
//! Between them sits a trampoline that drops blocks while the stream is not
//! started, logs driver status warnings (overflow, underflow, device errors),
//! and catches panics from the callback so they never unwind into the driver.
//!
//! The native layer is reached through [`AudioBackend`]. [`CpalBackend`] is used
//! for real devices; [`MockBackend`] injects synthetic blocks for tests.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod block;
mod callback;
mod config;
mod error;
mod forward;
mod status;
mod stream;

pub use backend::{
    default_input_device, list_input_devices, AudioBackend, CpalBackend, DeviceInfo, MockBackend,
    MockDevice, MockDriver, NativeStream, StreamParams,
};
pub use block::{AudioBlock, BlockTiming, OwnedBlock};
pub use callback::{BlockHandler, StreamStats};
pub use config::{DeviceId, StreamConfig};
pub use error::ListenError;
pub use forward::channel_callback;
pub use status::CallbackStatus;
pub use stream::{ActiveStream, InputStream, StreamState};

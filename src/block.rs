//! Audio blocks and their timing metadata.

use std::sync::Arc;
use std::time::Duration;

/// A borrowed view of one block of interleaved `f32` samples.
///
/// The slice belongs to the driver and is only valid for the duration of the
/// callback; copy it with [`to_owned_block()`](Self::to_owned_block) if it
/// needs to outlive the call.
///
/// # Example
///
/// ```
/// use audio_listen::AudioBlock;
///
/// let samples = [0.1, -0.1, 0.2, -0.2];
/// let block = AudioBlock::new(&samples, 2);
/// assert_eq!(block.shape(), (2, 2));
/// assert_eq!(block.frame(1), Some(&[0.2, -0.2][..]));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    samples: &'a [f32],
    channels: u16,
}

impl<'a> AudioBlock<'a> {
    /// Wraps interleaved samples with the given channel count.
    pub fn new(samples: &'a [f32], channels: u16) -> Self {
        Self { samples, channels }
    }

    /// Returns the raw interleaved samples.
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    /// Returns the number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the number of frames (one sample per channel each).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Returns `(frames, channels)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.frames(), self.channels as usize)
    }

    /// Returns `true` if this block contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the samples of frame `index`, one per channel.
    pub fn frame(&self, index: usize) -> Option<&'a [f32]> {
        if index >= self.frames() {
            return None;
        }
        let channels = self.channels as usize;
        let start = index * channels;
        self.samples.get(start..start + channels)
    }

    /// Iterates over frames.
    pub fn iter_frames(&self) -> impl Iterator<Item = &'a [f32]> {
        let channels = (self.channels as usize).max(1);
        let frames = self.frames();
        self.samples.chunks_exact(channels).take(frames)
    }

    /// Iterates over the samples of a single channel.
    pub fn channel(&self, channel: u16) -> impl Iterator<Item = f32> + 'a {
        let channels = (self.channels as usize).max(1);
        let skip = if channel < self.channels {
            channel as usize
        } else {
            self.samples.len()
        };
        self.samples.iter().skip(skip).step_by(channels).copied()
    }

    /// Copies the block into an [`OwnedBlock`].
    pub fn to_owned_block(&self, timing: BlockTiming) -> OwnedBlock {
        OwnedBlock {
            samples: Arc::new(self.samples.to_vec()),
            channels: self.channels,
            timing,
        }
    }
}

/// Timing information for a delivered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockTiming {
    /// Zero-based index of this block since the stream was opened.
    pub block_index: u64,
    /// Frames delivered before this block.
    pub frame_position: u64,
    /// Time of this callback relative to the stream's first callback.
    pub callback_time: Duration,
    /// How long ago the first frame of this block was captured, when the
    /// driver reports capture timestamps.
    pub capture_latency: Option<Duration>,
}

/// An owned copy of a block, for handing audio to other threads.
///
/// Samples are stored in an `Arc<Vec<f32>>`, so clones share the data.
#[derive(Debug, Clone)]
pub struct OwnedBlock {
    /// Interleaved samples.
    pub samples: Arc<Vec<f32>>,
    /// Number of channels.
    pub channels: u16,
    /// Timing of the block this was copied from.
    pub timing: BlockTiming,
}

impl OwnedBlock {
    /// Borrows this block as an [`AudioBlock`].
    pub fn as_block(&self) -> AudioBlock<'_> {
        AudioBlock::new(&self.samples, self.channels)
    }

    /// Returns the number of frames in this block.
    pub fn frames(&self) -> usize {
        self.as_block().frames()
    }

    /// Returns the duration of this block at the given sample rate.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(sample_rate))
    }
}

//! The per-block trampoline between the driver thread and user code.
//!
//! The native layer calls a [`BlockHandler`]; the handler built here gates on
//! the stream's lifecycle, reports driver status, and forwards the block to
//! the user callback with panics contained on the audio thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::block::{AudioBlock, BlockTiming};
use crate::status::CallbackStatus;

/// Handler invoked by a native stream once per block.
///
/// Receives interleaved `f32` samples, timing, and the driver status for
/// the block.
pub type BlockHandler = Box<dyn FnMut(&[f32], BlockTiming, CallbackStatus) + Send + 'static>;

/// Statistics about an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Blocks forwarded to the user callback.
    pub blocks_delivered: u64,
    /// Frames forwarded to the user callback.
    pub frames_delivered: u64,
    /// Blocks that arrived with a non-empty driver status.
    pub status_warnings: u64,
    /// Panics caught from the user callback.
    pub callback_panics: u64,
}

/// State shared between the stream handle and the audio thread.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub active: AtomicBool,
    pub closed: AtomicBool,
    pub blocks_delivered: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub status_warnings: AtomicU64,
    pub callback_panics: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if blocks should reach the user callback.
    pub fn accepts_blocks(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            blocks_delivered: self.blocks_delivered.load(Ordering::SeqCst),
            frames_delivered: self.frames_delivered.load(Ordering::SeqCst),
            status_warnings: self.status_warnings.load(Ordering::SeqCst),
            callback_panics: self.callback_panics.load(Ordering::SeqCst),
        }
    }
}

/// Forwards blocks from the driver to a user callback.
pub(crate) struct Trampoline<F> {
    callback: F,
    channels: u16,
    state: Arc<SharedState>,
}

impl<F> Trampoline<F>
where
    F: FnMut(AudioBlock<'_>, usize, BlockTiming) + Send + 'static,
{
    pub fn new(callback: F, channels: u16, state: Arc<SharedState>) -> Self {
        Self {
            callback,
            channels,
            state,
        }
    }

    /// Handles one block from the driver.
    ///
    /// Returns `true` if the block was forwarded to the user callback.
    pub fn on_block(
        &mut self,
        samples: &[f32],
        timing: BlockTiming,
        status: CallbackStatus,
    ) -> bool {
        if !self.state.accepts_blocks() {
            return false;
        }

        if !status.is_empty() {
            self.state.status_warnings.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                block = timing.block_index,
                status = status.bits(),
                "Audio: {status}"
            );
        }

        let block = AudioBlock::new(samples, self.channels);
        let frames = block.frames();
        let callback = &mut self.callback;
        let result = catch_unwind(AssertUnwindSafe(|| callback(block, frames, timing)));

        self.state.blocks_delivered.fetch_add(1, Ordering::Relaxed);
        self.state
            .frames_delivered
            .fetch_add(frames as u64, Ordering::Relaxed);

        if let Err(payload) = result {
            self.state.callback_panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                block = timing.block_index,
                "Audio callback panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        true
    }

    pub fn into_handler(mut self) -> BlockHandler {
        Box::new(move |samples, timing, status| {
            self.on_block(samples, timing, status);
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    type Seen = Arc<Mutex<Vec<(Vec<f32>, usize, BlockTiming)>>>;

    fn recording_trampoline(
        channels: u16,
    ) -> (
        Trampoline<impl FnMut(AudioBlock<'_>, usize, BlockTiming) + Send + 'static>,
        Seen,
        Arc<SharedState>,
    ) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let state = Arc::new(SharedState::new());
        state.active.store(true, Ordering::SeqCst);
        let trampoline = Trampoline::new(
            move |block: AudioBlock<'_>, frames, timing| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((block.samples().to_vec(), frames, timing));
            },
            channels,
            Arc::clone(&state),
        );
        (trampoline, seen, state)
    }

    #[test]
    #[traced_test]
    fn test_forwards_block_unchanged() {
        let (mut trampoline, seen, state) = recording_trampoline(2);
        let samples = [0.25, -0.25, 0.5, -0.5];
        let timing = BlockTiming {
            block_index: 3,
            frame_position: 768,
            ..BlockTiming::default()
        };

        assert!(trampoline.on_block(&samples, timing, CallbackStatus::EMPTY));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, samples.to_vec());
        assert_eq!(seen[0].1, 2);
        assert_eq!(seen[0].2, timing);
        assert_eq!(state.stats().frames_delivered, 2);
        assert!(!logs_contain("Audio:"));
    }

    #[test]
    #[traced_test]
    fn test_status_logs_exactly_one_line_and_still_forwards() {
        let (mut trampoline, seen, state) = recording_trampoline(1);
        let samples = [0.1f32; 64];

        trampoline.on_block(
            &samples,
            BlockTiming::default(),
            CallbackStatus::INPUT_OVERFLOW,
        );

        assert_eq!(seen.lock().unwrap()[0].0, samples.to_vec());
        assert_eq!(state.stats().status_warnings, 1);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("Audio: input overflow"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one diagnostic line, got {n}")),
            }
        });
    }

    #[test]
    fn test_inactive_state_drops_blocks() {
        let (mut trampoline, seen, state) = recording_trampoline(1);
        state.active.store(false, Ordering::SeqCst);
        assert!(!trampoline.on_block(&[0.0; 8], BlockTiming::default(), CallbackStatus::EMPTY));

        state.active.store(true, Ordering::SeqCst);
        state.closed.store(true, Ordering::SeqCst);
        assert!(!trampoline.on_block(&[0.0; 8], BlockTiming::default(), CallbackStatus::EMPTY));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(state.stats(), StreamStats::default());
    }

    #[test]
    #[traced_test]
    fn test_callback_panic_is_contained() {
        let state = Arc::new(SharedState::new());
        state.active.store(true, Ordering::SeqCst);
        let mut calls = 0u32;
        let mut trampoline = Trampoline::new(
            move |_: AudioBlock<'_>, _, _| {
                calls += 1;
                if calls == 1 {
                    panic!("bad block");
                }
            },
            1,
            Arc::clone(&state),
        );

        assert!(trampoline.on_block(&[0.0; 4], BlockTiming::default(), CallbackStatus::EMPTY));
        assert!(trampoline.on_block(&[0.0; 4], BlockTiming::default(), CallbackStatus::EMPTY));

        let stats = state.stats();
        assert_eq!(stats.callback_panics, 1);
        assert_eq!(stats.blocks_delivered, 2);
        assert!(logs_contain("Audio callback panicked: bad block"));
    }

    #[test]
    fn test_into_handler() {
        let (trampoline, seen, _state) = recording_trampoline(1);
        let mut handler = trampoline.into_handler();
        handler(&[1.0, 2.0], BlockTiming::default(), CallbackStatus::EMPTY);
        assert_eq!(seen.lock().unwrap()[0].1, 2);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}

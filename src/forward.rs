//! Forwarding blocks to async consumers.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{AudioBlock, BlockTiming, OwnedBlock};

/// Creates a stream callback that copies each block into `tx`.
///
/// The callback never blocks the driver thread: when the channel is full or
/// closed the block is dropped and a debug line is logged. Size the channel
/// for how far the consumer may fall behind.
///
/// # Example
///
/// ```ignore
/// use audio_listen::{channel_callback, InputStream, StreamConfig};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel(32);
/// let mut stream = InputStream::open(StreamConfig::default(), channel_callback(tx))?;
/// stream.start()?;
///
/// while let Some(block) = rx.recv().await {
///     // Send to a transcription service, meter, etc.
/// }
/// ```
pub fn channel_callback(
    tx: mpsc::Sender<OwnedBlock>,
) -> impl FnMut(AudioBlock<'_>, usize, BlockTiming) + Send + 'static {
    move |block, _frames, timing| match tx.try_send(block.to_owned_block(timing)) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            tracing::debug!(
                block = dropped.timing.block_index,
                "Forwarding channel full, dropping block"
            );
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(block = timing.block_index, "Forwarding channel closed");
        }
    }
}

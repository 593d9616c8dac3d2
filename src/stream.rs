//! The input stream handle.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::backend::{
    resolve_device, AudioBackend, CpalBackend, DeviceInfo, NativeStream, StreamParams,
};
use crate::callback::{SharedState, StreamStats, Trampoline};
use crate::{AudioBlock, BlockTiming, DeviceId, ListenError, StreamConfig};

/// Lifecycle state of an [`InputStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Opened but not delivering blocks.
    Stopped,
    /// Delivering blocks to the callback.
    Started,
    /// Closed; the native stream has been released. Terminal.
    Closed,
}

/// Handle to an open audio input stream.
///
/// Opening resolves the device, picks the sample rate (override or device
/// default) and opens the native stream without starting it. Each block the
/// driver captures after [`start()`](Self::start) is passed to the callback on
/// the driver's own thread as `(block, frame_count, timing)`.
///
/// # Lifecycle
///
/// 1. Created by [`open()`](Self::open) / [`open_with()`](Self::open_with) in the stopped state
/// 2. [`start()`](Self::start) begins delivery, [`stop()`](Self::stop) pauses it
/// 3. [`close()`](Self::close) releases the device; further calls are no-ops
/// 4. Dropping the handle also closes it
///
/// [`start_scoped()`](Self::start_scoped) and [`run()`](Self::run) start the
/// stream and guarantee it is closed when the scope ends, on every exit path.
///
/// # Callback rules
///
/// The callback runs with real-time constraints: it should not block, log
/// heavily or allocate without bound. The sample slice is only valid for the
/// duration of the call. A panic inside the callback is caught, logged and
/// counted in [`StreamStats::callback_panics`]; the stream keeps running.
///
/// # Example
///
/// ```ignore
/// use audio_listen::{InputStream, StreamConfig};
///
/// let stream = InputStream::open(StreamConfig::new("default"), |block, frames, timing| {
///     let peak = block.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
///     println!("block {} ({frames} frames): peak {peak:.3}", timing.block_index);
/// })?;
///
/// stream.run(|_| std::thread::sleep(std::time::Duration::from_secs(5)))?;
/// ```
pub struct InputStream {
    device_id: DeviceId,
    device: DeviceInfo,
    sample_rate: u32,
    channels: u16,
    state: StreamState,
    shared: Arc<SharedState>,
    // Dropping this stops the driver and releases the device
    native: Option<Box<dyn NativeStream>>,
}

impl InputStream {
    /// Opens an input stream on the default CPAL host.
    ///
    /// # Errors
    ///
    /// Returns a device-resolution error if `config.device` matches no input
    /// device, or [`ListenError::StreamOpen`] if the driver rejects the
    /// channel count or sample rate.
    pub fn open<F>(config: StreamConfig, callback: F) -> Result<Self, ListenError>
    where
        F: FnMut(AudioBlock<'_>, usize, BlockTiming) + Send + 'static,
    {
        Self::open_with(&CpalBackend::default_host(), config, callback)
    }

    /// Opens an input stream on the given backend.
    ///
    /// # Errors
    ///
    /// See [`open()`](Self::open).
    pub fn open_with<B, F>(
        backend: &B,
        config: StreamConfig,
        callback: F,
    ) -> Result<Self, ListenError>
    where
        B: AudioBackend + ?Sized,
        F: FnMut(AudioBlock<'_>, usize, BlockTiming) + Send + 'static,
    {
        config.validate()?;

        let device = resolve_device(backend, &config.device)?;
        let sample_rate = config.sample_rate.unwrap_or(device.default_sample_rate);
        if sample_rate == 0 {
            return Err(ListenError::stream_open(
                &device.name,
                "device reports no default sample rate",
            ));
        }
        if config.channels > device.max_input_channels {
            return Err(ListenError::stream_open(
                &device.name,
                format!(
                    "{} channels requested, device supports {}",
                    config.channels, device.max_input_channels
                ),
            ));
        }

        let params = StreamParams {
            channels: config.channels,
            sample_rate,
            block_size: config.block_size,
        };
        let shared = Arc::new(SharedState::new());
        let handler =
            Trampoline::new(callback, config.channels, Arc::clone(&shared)).into_handler();
        let native = backend.open_input(&device, &params, handler)?;

        tracing::info!(
            backend = backend.name(),
            channels = config.channels,
            "Listening on '{}' ({}) with sample rate {}",
            config.device,
            device.index,
            sample_rate
        );

        Ok(Self {
            device_id: config.device,
            device,
            sample_rate,
            channels: config.channels,
            state: StreamState::Stopped,
            shared,
            native: Some(native),
        })
    }

    /// Starts delivering blocks to the callback.
    ///
    /// Starting a started stream does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ListenError::StreamClosed`] after [`close()`](Self::close), or
    /// a backend error if the driver fails to start.
    pub fn start(&mut self) -> Result<(), ListenError> {
        let native = self.native.as_mut().ok_or(ListenError::StreamClosed)?;
        if self.state == StreamState::Started {
            return Ok(());
        }

        tracing::info!("Starting audio stream");
        self.shared.active.store(true, Ordering::SeqCst);
        if let Err(e) = native.start() {
            self.shared.active.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.state = StreamState::Started;
        Ok(())
    }

    /// Pauses delivery without releasing the device.
    ///
    /// Stopping a stopped stream does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ListenError::StreamClosed`] after [`close()`](Self::close), or
    /// a backend error if the driver fails to pause.
    pub fn stop(&mut self) -> Result<(), ListenError> {
        let native = self.native.as_mut().ok_or(ListenError::StreamClosed)?;
        if self.state == StreamState::Stopped {
            return Ok(());
        }

        tracing::info!("Stopping audio stream");
        self.shared.active.store(false, Ordering::SeqCst);
        if let Err(e) = native.stop() {
            // The driver is still running, so keep delivering
            self.shared.active.store(true, Ordering::SeqCst);
            return Err(e);
        }
        self.state = StreamState::Stopped;
        Ok(())
    }

    /// Stops delivery and releases the device.
    ///
    /// No callback runs after this returns. Closing a closed stream does nothing.
    pub fn close(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };

        tracing::info!("Closing audio stream");
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
        drop(native);
        self.state = StreamState::Closed;

        let stats = self.shared.stats();
        tracing::debug!(
            blocks = stats.blocks_delivered,
            frames = stats.frames_delivered,
            warnings = stats.status_warnings,
            panics = stats.callback_panics,
            "Audio stream closed"
        );
    }

    /// Starts the stream and returns a guard that closes it when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`start()`](Self::start). If starting fails the stream is
    /// closed before the error is returned.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut stream = InputStream::open(StreamConfig::default(), |_, _, _| {})?;
    /// {
    ///     let _active = stream.start_scoped()?;
    ///     std::thread::sleep(std::time::Duration::from_secs(1));
    /// } // closed here, even on early return or panic
    /// ```
    pub fn start_scoped(&mut self) -> Result<ActiveStream<'_>, ListenError> {
        if let Err(e) = self.start() {
            self.close();
            return Err(e);
        }
        Ok(ActiveStream { stream: self })
    }

    /// Starts the stream, runs `body`, then closes the stream.
    ///
    /// The stream is closed even if `body` panics.
    ///
    /// # Errors
    ///
    /// Returns an error only if the stream fails to start.
    pub fn run<R>(mut self, body: impl FnOnce(&InputStream) -> R) -> Result<R, ListenError> {
        let active = self.start_scoped()?;
        Ok(body(&*active))
    }

    /// Returns the identifier the stream was opened with.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Returns the resolved device.
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Returns the effective sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of captured channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Returns `true` while blocks are being delivered.
    pub fn is_active(&self) -> bool {
        self.state == StreamState::Started
    }

    /// Returns `true` once the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Returns delivery statistics.
    pub fn stats(&self) -> StreamStats {
        self.shared.stats()
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("device_id", &self.device_id)
            .field("device", &self.device.name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// A started stream that is closed when this guard is dropped.
///
/// Returned by [`InputStream::start_scoped()`]. Dereferences to the stream
/// for read access.
#[must_use = "the stream is closed as soon as the guard is dropped"]
pub struct ActiveStream<'a> {
    stream: &'a mut InputStream,
}

impl ActiveStream<'_> {
    /// Closes the stream now instead of at the end of the scope.
    pub fn close(self) {
        drop(self);
    }
}

impl std::ops::Deref for ActiveStream<'_> {
    type Target = InputStream;

    fn deref(&self) -> &InputStream {
        &*self.stream
    }
}

impl Drop for ActiveStream<'_> {
    fn drop(&mut self) {
        self.stream.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockDevice};
    use crate::CallbackStatus;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    fn counting(
        count: &Arc<AtomicUsize>,
    ) -> impl FnMut(AudioBlock<'_>, usize, BlockTiming) + Send + 'static {
        let count = Arc::clone(count);
        move |_, _, _| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    #[traced_test]
    fn test_open_logs_confirmation() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let stream =
            InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap();

        assert_eq!(stream.state(), StreamState::Stopped);
        assert!(logs_contain("Listening on 'default' (0) with sample rate 48000"));
    }

    #[test]
    fn test_sample_rate_override() {
        let backend = MockBackend::with_default_input(48_000, 2);
        let stream = InputStream::open_with(
            &backend,
            StreamConfig::default().channels(2).sample_rate(44_100),
            |_, _, _| {},
        )
        .unwrap();
        assert_eq!(stream.sample_rate(), 44_100);
        assert_eq!(stream.channels(), 2);
    }

    #[test]
    fn test_invalid_config_opens_nothing() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let err =
            InputStream::open_with(&backend, StreamConfig::default().channels(0), |_, _, _| {})
                .unwrap_err();
        assert!(matches!(err, ListenError::InvalidConfig { .. }));
        assert_eq!(backend.opened_total(), 0);
    }

    #[test]
    fn test_too_many_channels_is_stream_open_error() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let err =
            InputStream::open_with(&backend, StreamConfig::default().channels(4), |_, _, _| {})
                .unwrap_err();
        assert!(matches!(err, ListenError::StreamOpen { .. }));
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_zero_default_rate_without_override() {
        let backend = MockBackend::new()
            .with_device(MockDevice::input("Odd Device", 0, 1))
            .with_default(0);
        let err =
            InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap_err();
        assert!(matches!(err, ListenError::StreamOpen { .. }));
    }

    #[test]
    fn test_start_stop_transitions() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let driver = backend.driver();
        let count = Arc::new(AtomicUsize::new(0));
        let mut stream =
            InputStream::open_with(&backend, StreamConfig::default(), counting(&count)).unwrap();

        assert!(!driver.deliver_silence(64));
        stream.start().unwrap();
        stream.start().unwrap();
        assert!(stream.is_active());
        assert!(driver.deliver_silence(64));

        stream.stop().unwrap();
        stream.stop().unwrap();
        assert_eq!(stream.state(), StreamState::Stopped);
        assert!(!driver.deliver_silence(64));

        stream.start().unwrap();
        assert!(driver.deliver_silence(64));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_stop_keeps_delivering() {
        let backend = MockBackend::with_default_input(48_000, 1).fail_stop("pause rejected");
        let driver = backend.driver();
        let count = Arc::new(AtomicUsize::new(0));
        let mut stream =
            InputStream::open_with(&backend, StreamConfig::default(), counting(&count)).unwrap();
        stream.start().unwrap();

        assert!(matches!(stream.stop(), Err(ListenError::Backend(_))));
        assert_eq!(stream.state(), StreamState::Started);
        assert!(stream.is_active());

        stream.start().unwrap();
        assert!(driver.deliver_silence(64));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(stream.stats().blocks_delivered, 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let mut stream =
            InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap();
        stream.start().unwrap();

        stream.close();
        stream.close();
        assert!(stream.is_closed());
        assert_eq!(backend.open_streams(), 0);
        assert!(matches!(stream.start(), Err(ListenError::StreamClosed)));
        assert!(matches!(stream.stop(), Err(ListenError::StreamClosed)));

        drop(stream);
        assert_eq!(backend.opened_total(), 1);
    }

    #[test]
    #[traced_test]
    fn test_close_logs_once() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let mut stream =
            InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap();
        stream.close();
        stream.close();
        drop(stream);

        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Closing audio stream")).count() {
                1 => Ok(()),
                n => Err(format!("expected one close line, got {n}")),
            }
        });
    }

    #[test]
    fn test_drop_closes_native_stream() {
        let backend = MockBackend::with_default_input(48_000, 1);
        {
            let mut stream =
                InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap();
            stream.start().unwrap();
            assert_eq!(backend.open_streams(), 1);
        }
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    #[traced_test]
    fn test_scoped_start_and_close() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let driver = backend.driver();
        let count = Arc::new(AtomicUsize::new(0));
        let mut stream =
            InputStream::open_with(&backend, StreamConfig::default(), counting(&count)).unwrap();

        {
            let active = stream.start_scoped().unwrap();
            assert!(active.is_active());
            assert!(driver.deliver_silence(32));
        }

        assert!(stream.is_closed());
        assert!(!driver.deliver_silence(32));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Starting audio stream"));
        assert!(logs_contain("Closing audio stream"));
    }

    #[test]
    fn test_scoped_closes_on_error_path() {
        fn body(stream: &mut InputStream) -> Result<(), ListenError> {
            let _active = stream.start_scoped()?;
            Err(ListenError::Backend("body failed".to_string()))
        }

        let backend = MockBackend::with_default_input(48_000, 1);
        let mut stream =
            InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap();

        assert!(body(&mut stream).is_err());
        assert!(stream.is_closed());
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_run_returns_body_result() {
        let backend = MockBackend::with_default_input(48_000, 1);
        let driver = backend.driver();
        let stream =
            InputStream::open_with(&backend, StreamConfig::default(), |_, _, _| {}).unwrap();

        let delivered = stream
            .run(|s| {
                assert!(s.is_active());
                driver.deliver_status(16, CallbackStatus::INPUT_UNDERFLOW);
                s.stats()
            })
            .unwrap();

        assert_eq!(delivered.blocks_delivered, 1);
        assert_eq!(delivered.status_warnings, 1);
        assert_eq!(backend.open_streams(), 0);
    }
}

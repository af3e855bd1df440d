//! Pluggable audio backend abstraction.
//!
//! [`AudioBackend`] decouples the runtime from any specific platform audio
//! API. The trait uses boxed closures for callbacks rather than generic
//! parameters, making it object-safe, and streams are returned as
//! [`StreamHandle`], a type-erased RAII wrapper: the stream plays while the
//! handle lives and stops when it drops. This keeps platform types out of
//! the supervisor and lets tests drive the callback without a device at all.

use crate::{AudioDevice, Result};

/// Configuration for building an output stream.
#[derive(Debug, Clone)]
pub struct BackendStreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Requested buffer size in frames; must match the engine block size.
    pub buffer_size: u32,
    /// Number of output channels (the mono core is duplicated per channel).
    pub channels: u16,
    /// Optional device name filter (system default if `None`).
    pub device_name: Option<String>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            device_name: None,
        }
    }
}

/// Type-erased audio stream handle.
///
/// The stream is active while this handle exists; dropping it stops
/// playback regardless of which backend produced it.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wraps a backend-specific stream object, keeping it alive until drop.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Audio output callback.
///
/// Invoked on the real-time audio thread with an interleaved f32 buffer of
/// `frames × channels` samples to fill. Implementations must not allocate,
/// lock, or log.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Error callback, invoked with a human-readable message when the backend
/// reports a streaming error.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Object-safe trait over the platform audio API.
pub trait AudioBackend: Send {
    /// Human-readable backend name (e.g. "cpal").
    fn name(&self) -> &'static str;

    /// Lists available output devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;

    /// The system default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// Builds and starts an output stream.
    ///
    /// The returned handle keeps the stream alive; dropping it stops
    /// playback.
    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;
}

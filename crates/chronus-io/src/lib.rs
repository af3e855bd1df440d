//! Audio device layer for the chronus runtime.
//!
//! This crate owns the boundary to the OS audio backend:
//!
//! - [`AudioBackend`] - object-safe trait over the platform audio API
//! - [`CpalBackend`] - the default implementation (ALSA, CoreAudio, WASAPI)
//! - [`list_devices`] / [`default_output_device`] - device enumeration
//!
//! The runtime is output-only: the supervisor hands `build_output_stream` a
//! callback that pulls blocks from the active slot's ring. Everything the
//! callback touches is lock-free; this crate never looks inside it.

mod backend;
mod cpal_backend;
mod stream;

pub use backend::{AudioBackend, BackendStreamConfig, ErrorCallback, OutputCallback, StreamHandle};
pub use cpal_backend::CpalBackend;
pub use stream::{AudioDevice, default_output_device, list_devices};

/// Error types for device and stream operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stream setup or runtime error from the backend.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// No audio output device available on the system.
    #[error("no audio output device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
}

/// Convenience result type for device operations.
pub type Result<T> = std::result::Result<T, Error>;

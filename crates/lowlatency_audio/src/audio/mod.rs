//! Audio system
//!
//! Decoders turn files into PCM, the [`asset_registry`] owns the uploaded
//! buffers, the [`voice_manager`] owns the per-asset voice pools and the
//! [`lifecycle`] monitor closes the output device after a quiet period.

pub mod asset_registry;
pub mod backend;
pub mod decoder;
pub mod lifecycle;
pub mod voice_manager;

pub use asset_registry::{Asset, AssetRegistry, PreloadKind};
pub use backend::{AudioBackend, BufferHandle, SimulatedBackend, SourceHandle, SourceState};
pub use decoder::{DecodeError, DecodedAudio, SampleFormat};
pub use lifecycle::{DeviceLifecycleMonitor, SharedDevice};
pub use voice_manager::{LoopOutcome, PlayOutcome, Voice, VoiceManager, VoicePool};

use std::path::PathBuf;
use thiserror::Error;

/// Audio engine errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// The file was found but could not be decoded
    #[error("Not loaded. Failed to decode {id}: {source}")]
    Decode {
        /// Asset id the preload was for
        id: String,
        /// Decoder failure
        #[source]
        source: DecodeError,
    },

    /// No asset is registered under this id
    #[error("Could not find the file {0}. Maybe it hasn't been loaded.")]
    NotLoaded(String),

    /// The asset file does not exist
    #[error("Not loaded. Could not find file {id} at {}", path.display())]
    AssetNotFound {
        /// Asset id the preload was for
        id: String,
        /// Resolved path that was looked up
        path: PathBuf,
    },

    /// IO error while reading an asset
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied argument is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A buffer or source handle does not exist on the current device
    #[error("Invalid audio handle")]
    InvalidHandle,

    /// The output device could not be opened
    #[error("Failed to initialize audio backend: {0}")]
    BackendInitFailed(String),

    /// The backend rejected an operation
    #[error("Audio backend failure: {0}")]
    BackendFailure(String),

    /// The operation needs an open device
    #[error("Audio device is not available")]
    DeviceUnavailable,

    /// A thread panicked while holding the device lock
    #[error("Audio device lock is poisoned")]
    DevicePoisoned,

    /// The idle teardown thread could not be started
    #[error("Failed to start device lifecycle monitor: {0}")]
    MonitorSpawn(#[source] std::io::Error),
}

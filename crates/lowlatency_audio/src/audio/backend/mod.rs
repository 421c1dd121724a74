//! Audio backend implementations
//!
//! Platform-independent abstraction over the output device. Every hardware
//! interaction of the engine goes through [`AudioBackend`], which mirrors the
//! buffer/source model of OpenAL-style APIs.
//!
//! # Device generations
//! Handles are only valid within the device generation that created them.
//! `release_device` invalidates every buffer and source at once; the next
//! `acquire_device` starts a new generation. Callers compare
//! [`AudioBackend::device_generation`] to find out whether their handles still
//! refer to anything.

#[cfg(feature = "rodio-backend")]
pub mod rodio_backend;
pub mod simulated;

pub use crate::foundation::collections::{BufferHandle, SourceHandle};
pub use simulated::SimulatedBackend;

use crate::audio::decoder::DecodedAudio;
use crate::audio::AudioError;

/// Observable playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Not producing audio: never started, stopped, or finished
    Idle,
    /// Currently producing audio
    Playing,
}

/// Capability interface over an audio output device
///
/// `Send` is required because the device is shared with the idle teardown
/// monitor thread.
pub trait AudioBackend: Send {
    /// Open the output device, starting a new device generation
    ///
    /// Calling this while the device is already acquired is a no-op.
    fn acquire_device(&mut self) -> Result<(), AudioError>;

    /// Close the output device, invalidating every buffer and source
    fn release_device(&mut self);

    /// Check whether the output device is currently open
    fn is_device_acquired(&self) -> bool;

    /// Generation counter, bumped by each successful `acquire_device`
    fn device_generation(&self) -> u64;

    /// Upload decoded PCM into a new buffer
    fn create_buffer(&mut self, audio: &DecodedAudio) -> Result<BufferHandle, AudioError>;

    /// Free a buffer; unknown handles are ignored
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Create a new, idle source with no buffer bound
    fn create_source(&mut self) -> Result<SourceHandle, AudioError>;

    /// Free a source, stopping it first; unknown handles are ignored
    fn destroy_source(&mut self, source: SourceHandle);

    /// Bind a buffer to a source
    fn bind_buffer(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<(), AudioError>;

    /// Set the linear gain of a source
    fn set_gain(&mut self, source: SourceHandle, gain: f32) -> Result<(), AudioError>;

    /// Set whether the source repeats its buffer when started
    fn set_looping(&mut self, source: SourceHandle, looping: bool) -> Result<(), AudioError>;

    /// Start a source from the beginning of its buffer
    ///
    /// A source that is already playing restarts from the beginning.
    fn play(&mut self, source: SourceHandle) -> Result<(), AudioError>;

    /// Stop a source; stopping an idle source is a no-op
    fn stop(&mut self, source: SourceHandle) -> Result<(), AudioError>;

    /// Current state of a source; unknown handles report `Idle`
    fn query_state(&self, source: SourceHandle) -> SourceState;

    /// Seconds played since the source was last started; unknown handles report 0
    fn query_elapsed(&self, source: SourceHandle) -> f32;
}

//! Deterministic in-memory backend
//!
//! Behaves like a real device as far as the engine can observe, but playback
//! only advances when [`SimulatedBackend::advance`] is called. Used by the
//! test suite and by the console's `--simulated` mode.

use super::{AudioBackend, BufferHandle, SourceHandle, SourceState};
use crate::audio::decoder::DecodedAudio;
use crate::audio::AudioError;
use crate::foundation::collections::HandleMap;

#[derive(Debug, Clone)]
struct SimBuffer {
    /// Playback length in seconds
    duration: f32,
}

#[derive(Debug, Clone)]
struct SimSource {
    buffer: Option<BufferHandle>,
    gain: f32,
    looping: bool,
    playing: bool,
    elapsed: f32,
    starts: u32,
}

impl SimSource {
    const fn new() -> Self {
        Self {
            buffer: None,
            gain: 1.0,
            looping: false,
            playing: false,
            elapsed: 0.0,
            starts: 0,
        }
    }
}

/// Simulated audio device with a manually driven clock
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    acquired: bool,
    generation: u64,
    device_available: bool,
    source_limit: Option<usize>,
    buffers: HandleMap<BufferHandle, SimBuffer>,
    sources: HandleMap<SourceHandle, SimSource>,
    releases: u32,
}

impl SimulatedBackend {
    /// Create a simulated backend whose device can always be opened
    pub fn new() -> Self {
        Self {
            device_available: true,
            ..Self::default()
        }
    }

    /// Limit the number of live sources, making further `create_source` calls fail
    pub fn with_source_limit(mut self, limit: usize) -> Self {
        self.source_limit = Some(limit);
        self
    }

    /// Make subsequent `acquire_device` calls succeed or fail
    pub fn set_device_available(&mut self, available: bool) {
        self.device_available = available;
    }

    /// Advance the playback clock of every playing source
    ///
    /// One-shot sources that reach the end of their buffer return to idle;
    /// looping sources wrap around.
    pub fn advance(&mut self, seconds: f32) {
        for source in self.sources.values_mut().filter(|s| s.playing) {
            let duration = source
                .buffer
                .and_then(|buffer| self.buffers.get(buffer))
                .map_or(0.0, |buffer| buffer.duration);

            source.elapsed += seconds;
            if source.elapsed < duration {
                continue;
            }
            if source.looping && duration > 0.0 {
                source.elapsed %= duration;
            } else {
                source.playing = false;
                source.elapsed = 0.0;
            }
        }
    }

    /// Force the playback offset of a source
    pub fn set_elapsed(&mut self, source: SourceHandle, seconds: f32) {
        if let Some(source) = self.sources.get_mut(source) {
            source.elapsed = seconds;
        }
    }

    /// Gain of a source
    pub fn gain(&self, source: SourceHandle) -> Option<f32> {
        self.sources.get(source).map(|s| s.gain)
    }

    /// Looping flag of a source
    pub fn is_looping(&self, source: SourceHandle) -> Option<bool> {
        self.sources.get(source).map(|s| s.looping)
    }

    /// Buffer bound to a source
    pub fn bound_buffer(&self, source: SourceHandle) -> Option<BufferHandle> {
        self.sources.get(source).and_then(|s| s.buffer)
    }

    /// Number of times a source has been started or restarted
    pub fn start_count(&self, source: SourceHandle) -> u32 {
        self.sources.get(source).map_or(0, |s| s.starts)
    }

    /// Number of live sources on the current device
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of live buffers on the current device
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of times the device has been released
    pub const fn release_count(&self) -> u32 {
        self.releases
    }

    fn source_mut(&mut self, source: SourceHandle) -> Result<&mut SimSource, AudioError> {
        if !self.acquired {
            return Err(AudioError::DeviceUnavailable);
        }
        self.sources.get_mut(source).ok_or(AudioError::InvalidHandle)
    }
}

impl AudioBackend for SimulatedBackend {
    fn acquire_device(&mut self) -> Result<(), AudioError> {
        if self.acquired {
            return Ok(());
        }
        if !self.device_available {
            return Err(AudioError::BackendInitFailed(
                "simulated device is unavailable".to_string(),
            ));
        }
        self.acquired = true;
        self.generation += 1;
        log::debug!("simulated device acquired (generation {})", self.generation);
        Ok(())
    }

    fn release_device(&mut self) {
        if !self.acquired {
            return;
        }
        self.sources.clear();
        self.buffers.clear();
        self.acquired = false;
        self.releases += 1;
        log::debug!("simulated device released (generation {})", self.generation);
    }

    fn is_device_acquired(&self) -> bool {
        self.acquired
    }

    fn device_generation(&self) -> u64 {
        self.generation
    }

    fn create_buffer(&mut self, audio: &DecodedAudio) -> Result<BufferHandle, AudioError> {
        if !self.acquired {
            return Err(AudioError::DeviceUnavailable);
        }
        Ok(self.buffers.insert(SimBuffer {
            duration: audio.duration().as_secs_f32(),
        }))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn create_source(&mut self) -> Result<SourceHandle, AudioError> {
        if !self.acquired {
            return Err(AudioError::DeviceUnavailable);
        }
        if self.source_limit.is_some_and(|limit| self.sources.len() >= limit) {
            return Err(AudioError::BackendFailure(
                "simulated source limit reached".to_string(),
            ));
        }
        Ok(self.sources.insert(SimSource::new()))
    }

    fn destroy_source(&mut self, source: SourceHandle) {
        self.sources.remove(source);
    }

    fn bind_buffer(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<(), AudioError> {
        if !self.buffers.contains_key(buffer) {
            return Err(AudioError::InvalidHandle);
        }
        self.source_mut(source)?.buffer = Some(buffer);
        Ok(())
    }

    fn set_gain(&mut self, source: SourceHandle, gain: f32) -> Result<(), AudioError> {
        self.source_mut(source)?.gain = gain;
        Ok(())
    }

    fn set_looping(&mut self, source: SourceHandle, looping: bool) -> Result<(), AudioError> {
        self.source_mut(source)?.looping = looping;
        Ok(())
    }

    fn play(&mut self, source: SourceHandle) -> Result<(), AudioError> {
        let source = self.source_mut(source)?;
        if source.buffer.is_none() {
            return Err(AudioError::InvalidArgument("source has no buffer bound".to_string()));
        }
        source.playing = true;
        source.elapsed = 0.0;
        source.starts += 1;
        Ok(())
    }

    fn stop(&mut self, source: SourceHandle) -> Result<(), AudioError> {
        let source = self.source_mut(source)?;
        source.playing = false;
        source.elapsed = 0.0;
        Ok(())
    }

    fn query_state(&self, source: SourceHandle) -> SourceState {
        match self.sources.get(source) {
            Some(s) if s.playing => SourceState::Playing,
            _ => SourceState::Idle,
        }
    }

    fn query_elapsed(&self, source: SourceHandle) -> f32 {
        self.sources.get(source).map_or(0.0, |s| s.elapsed)
    }
}

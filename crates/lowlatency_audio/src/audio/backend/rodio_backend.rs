//! Rodio audio backend implementation
//!
//! Uses the Rodio library for cross-platform audio output. Each source is a
//! rodio [`Sink`]; each buffer is a reference-counted block of 16-bit samples
//! that every bound sink plays through a cheap [`PcmSource`] cursor, so
//! triggering or restarting a voice never copies sample data.
//!
//! # Example
//!
//! ```no_run
//! use lowlatency_audio::audio::backend::AudioBackend;
//! use lowlatency_audio::audio::backend::rodio_backend::RodioBackend;
//! use lowlatency_audio::audio::decoder;
//!
//! let mut backend = RodioBackend::new();
//! backend.acquire_device().unwrap();
//!
//! let audio = decoder::decode(&std::fs::read("sounds/boom.wav").unwrap()).unwrap();
//! let buffer = backend.create_buffer(&audio).unwrap();
//! let source = backend.create_source().unwrap();
//! backend.bind_buffer(source, buffer).unwrap();
//! backend.set_gain(source, 0.8).unwrap();
//! backend.play(source).unwrap();
//!
//! backend.release_device();
//! ```

use super::{AudioBackend, BufferHandle, SourceHandle, SourceState};
use crate::audio::decoder::{DecodedAudio, SampleFormat};
use crate::audio::AudioError;
use crate::foundation::collections::HandleMap;
use rodio::source::SeekError;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 16-bit samples shared by every sink bound to the same buffer
#[derive(Debug, Clone)]
struct PcmData {
    samples: Arc<[i16]>,
    channels: u16,
    sample_rate: u32,
}

impl PcmData {
    fn from_decoded(audio: &DecodedAudio) -> Self {
        Self {
            samples: to_i16_samples(audio.pcm(), audio.format()).into(),
            channels: audio.format().channels(),
            sample_rate: audio.sample_rate(),
        }
    }
}

/// Convert raw PCM bytes to signed 16-bit samples
///
/// 8-bit WAV data is unsigned with a midpoint of 128.
fn to_i16_samples(pcm: &[u8], format: SampleFormat) -> Vec<i16> {
    match format.bits_per_sample() {
        8 => pcm.iter().map(|&b| (i16::from(b) - 128) << 8).collect(),
        _ => pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    }
}

/// Playback cursor over a shared sample block
#[derive(Debug, Clone)]
pub struct PcmSource {
    samples: Arc<[i16]>,
    channels: u16,
    sample_rate: u32,
    position: usize,
}

impl PcmSource {
    fn new(data: &PcmData) -> Self {
        Self {
            samples: Arc::clone(&data.samples),
            channels: data.channels,
            sample_rate: data.sample_rate,
            position: 0,
        }
    }
}

impl Iterator for PcmSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        let sample = self.samples.get(self.position).copied();
        self.position += 1;
        sample
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.samples.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl Source for PcmSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.samples.len().saturating_sub(self.position))
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        Some(Duration::from_secs_f64(
            frames as f64 / f64::from(self.sample_rate.max(1)),
        ))
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        let frame = (pos.as_secs_f64() * f64::from(self.sample_rate)) as usize;
        self.position = (frame * usize::from(self.channels)).min(self.samples.len());
        Ok(())
    }
}

/// Output stream pinned to its own thread
///
/// `OutputStream` is not `Send`, so it is created and dropped on a dedicated
/// thread; only the `Send` stream handle leaves it. Dropping this value closes
/// the stream.
struct DeviceThread {
    handle: OutputStreamHandle,
    shutdown: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DeviceThread {
    fn open() -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("audio-device".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if ready_tx.send(Ok(handle)).is_ok() {
                        // Blocks until the sender is dropped
                        let _ = shutdown_rx.recv();
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| AudioError::BackendInitFailed(format!("Failed to spawn device thread: {e}")))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| AudioError::BackendInitFailed("Device thread exited early".to_string()))?
            .map_err(|e| AudioError::BackendInitFailed(format!("Failed to create audio output: {e}")))?;

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Audio device thread panicked");
            }
        }
    }
}

/// One rodio sink acting as a voice
struct SinkSlot {
    sink: Sink,
    buffer: Option<BufferHandle>,
    looping: bool,
    /// Set by `stop` so state queries do not wait for the mixer to drain the sink
    halted: bool,
}

/// Rodio-based audio backend
pub struct RodioBackend {
    device: Option<DeviceThread>,
    generation: u64,
    buffers: HandleMap<BufferHandle, PcmData>,
    sources: HandleMap<SourceHandle, SinkSlot>,
}

impl RodioBackend {
    /// Create a new Rodio backend; the device is opened by `acquire_device`
    pub fn new() -> Self {
        Self {
            device: None,
            generation: 0,
            buffers: HandleMap::with_key(),
            sources: HandleMap::with_key(),
        }
    }

    fn slot(&self, source: SourceHandle) -> Result<&SinkSlot, AudioError> {
        if self.device.is_none() {
            return Err(AudioError::DeviceUnavailable);
        }
        self.sources.get(source).ok_or(AudioError::InvalidHandle)
    }

    fn slot_mut(&mut self, source: SourceHandle) -> Result<&mut SinkSlot, AudioError> {
        if self.device.is_none() {
            return Err(AudioError::DeviceUnavailable);
        }
        self.sources.get_mut(source).ok_or(AudioError::InvalidHandle)
    }
}

impl AudioBackend for RodioBackend {
    fn acquire_device(&mut self) -> Result<(), AudioError> {
        if self.device.is_some() {
            return Ok(());
        }

        self.device = Some(DeviceThread::open()?);
        self.generation += 1;

        log::info!("Rodio audio device opened (generation {})", self.generation);
        Ok(())
    }

    fn release_device(&mut self) {
        if self.device.is_none() {
            return;
        }

        for (_handle, slot) in self.sources.drain() {
            slot.sink.stop();
        }
        self.buffers.clear();
        self.device = None;

        log::info!("Rodio audio device closed (generation {})", self.generation);
    }

    fn is_device_acquired(&self) -> bool {
        self.device.is_some()
    }

    fn device_generation(&self) -> u64 {
        self.generation
    }

    fn create_buffer(&mut self, audio: &DecodedAudio) -> Result<BufferHandle, AudioError> {
        if self.device.is_none() {
            return Err(AudioError::DeviceUnavailable);
        }
        Ok(self.buffers.insert(PcmData::from_decoded(audio)))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn create_source(&mut self) -> Result<SourceHandle, AudioError> {
        let device = self.device.as_ref().ok_or(AudioError::DeviceUnavailable)?;
        let sink = Sink::try_new(&device.handle)
            .map_err(|e| AudioError::BackendFailure(format!("Failed to create sink: {e}")))?;

        Ok(self.sources.insert(SinkSlot {
            sink,
            buffer: None,
            looping: false,
            halted: true,
        }))
    }

    fn destroy_source(&mut self, source: SourceHandle) {
        if let Some(slot) = self.sources.remove(source) {
            slot.sink.stop();
        }
    }

    fn bind_buffer(&mut self, source: SourceHandle, buffer: BufferHandle) -> Result<(), AudioError> {
        if !self.buffers.contains_key(buffer) {
            return Err(AudioError::InvalidHandle);
        }
        self.slot_mut(source)?.buffer = Some(buffer);
        Ok(())
    }

    fn set_gain(&mut self, source: SourceHandle, gain: f32) -> Result<(), AudioError> {
        self.slot(source)?.sink.set_volume(gain);
        Ok(())
    }

    fn set_looping(&mut self, source: SourceHandle, looping: bool) -> Result<(), AudioError> {
        self.slot_mut(source)?.looping = looping;
        Ok(())
    }

    fn play(&mut self, source: SourceHandle) -> Result<(), AudioError> {
        let slot = self.sources.get_mut(source).ok_or(AudioError::InvalidHandle)?;
        let buffer = slot
            .buffer
            .ok_or_else(|| AudioError::InvalidArgument("source has no buffer bound".to_string()))?;
        let data = self.buffers.get(buffer).ok_or(AudioError::InvalidHandle)?;

        // Always restart with a fresh cursor. `Sink::try_seek` waits for the mixer
        // to take the order and never returns if the source ends first; `append`
        // after `stop` only waits for the stopped source to drain.
        slot.sink.stop();
        let pcm = PcmSource::new(data);
        if slot.looping {
            slot.sink.append(pcm.repeat_infinite());
        } else {
            slot.sink.append(pcm);
        }
        slot.sink.play();
        slot.halted = false;
        Ok(())
    }

    fn stop(&mut self, source: SourceHandle) -> Result<(), AudioError> {
        let slot = self.slot_mut(source)?;
        slot.sink.stop();
        slot.halted = true;
        Ok(())
    }

    fn query_state(&self, source: SourceHandle) -> SourceState {
        match self.sources.get(source) {
            Some(slot) if !slot.halted && !slot.sink.empty() && !slot.sink.is_paused() => {
                SourceState::Playing
            }
            _ => SourceState::Idle,
        }
    }

    fn query_elapsed(&self, source: SourceHandle) -> f32 {
        self.sources
            .get(source)
            .map_or(0.0, |slot| slot.sink.get_pos().as_secs_f32())
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.release_device();
    }
}

//! Voice management system
//!
//! Owns, per asset, an ordered pool of voices created at preload time.
//! Implements offset-based voice stealing when every voice in a pool is busy.
//!
//! Pool order is the order the voices were created in and never changes:
//! `play` scans it front to back and `loop_last` only ever touches the final
//! voice.

use crate::audio::backend::{AudioBackend, BufferHandle, SourceHandle, SourceState};
use crate::audio::AudioError;
use std::collections::HashMap;

/// One playable instance of an asset
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    /// Backend source handle
    source: SourceHandle,
    /// Asset this voice plays
    asset_id: String,
    /// Gain fixed at creation
    gain: f32,
    /// Whether the voice repeats when started
    looping: bool,
}

impl Voice {
    /// Backend source handle
    pub const fn source(&self) -> SourceHandle {
        self.source
    }

    /// Id of the owning asset
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Gain fixed at creation
    pub const fn gain(&self) -> f32 {
        self.gain
    }

    /// Whether the voice is marked as looping
    pub const fn is_looping(&self) -> bool {
        self.looping
    }
}

/// Ordered voices of one asset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoicePool {
    voices: Vec<Voice>,
}

impl VoicePool {
    /// Voices in creation order
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Number of voices
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Check whether the pool has no voices
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

/// Result of [`VoiceManager::play`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// An idle voice at this pool index was started
    Started(usize),
    /// Every voice was busy; the voice at this pool index was restarted
    Stolen(usize),
}

/// Result of [`VoiceManager::loop_last`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The last voice was idle and is now looping
    Started,
    /// The last voice was already playing and was left alone
    AlreadyPlaying,
}

/// Voice manager for allocation and pooling
#[derive(Debug, Default)]
pub struct VoiceManager {
    pools: HashMap<String, VoicePool>,
}

impl VoiceManager {
    /// Create an empty voice manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `count` voices for an asset, all bound to `buffer` at `gain`
    ///
    /// Either all voices are created or none: sources created before a
    /// failure are destroyed before the error is returned. An existing pool
    /// for the same asset is replaced.
    pub fn allocate_pool<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        asset_id: &str,
        buffer: BufferHandle,
        gain: f32,
        count: usize,
    ) -> Result<(), AudioError> {
        if count == 0 {
            return Err(AudioError::InvalidArgument(format!(
                "voice pool for {asset_id} needs at least one voice"
            )));
        }

        let gains = vec![gain; count];
        let voices = Self::create_voices(backend, asset_id, buffer, &gains)?;
        log::debug!("Allocated {count} voice(s) for {asset_id} at gain {gain}");
        self.pools.insert(asset_id.to_string(), VoicePool { voices });
        Ok(())
    }

    /// Recreate a pool on a new device generation
    ///
    /// Count, order and gains are preserved; the new voices are idle and not
    /// looping. The old source handles are assumed dead and are not touched.
    pub fn rebuild_pool<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        asset_id: &str,
        buffer: BufferHandle,
    ) -> Result<(), AudioError> {
        let pool = self
            .pools
            .get_mut(asset_id)
            .ok_or_else(|| AudioError::NotLoaded(asset_id.to_string()))?;

        let gains: Vec<f32> = pool.voices.iter().map(|voice| voice.gain).collect();
        pool.voices = Self::create_voices(backend, asset_id, buffer, &gains)?;
        Ok(())
    }

    fn create_voices<B: AudioBackend + ?Sized>(
        backend: &mut B,
        asset_id: &str,
        buffer: BufferHandle,
        gains: &[f32],
    ) -> Result<Vec<Voice>, AudioError> {
        let mut voices: Vec<Voice> = Vec::with_capacity(gains.len());

        for &gain in gains {
            match Self::create_voice(backend, buffer, gain) {
                Ok(source) => voices.push(Voice {
                    source,
                    asset_id: asset_id.to_string(),
                    gain,
                    looping: false,
                }),
                Err(e) => {
                    for voice in &voices {
                        backend.destroy_source(voice.source);
                    }
                    return Err(e);
                }
            }
        }

        Ok(voices)
    }

    fn create_voice<B: AudioBackend + ?Sized>(
        backend: &mut B,
        buffer: BufferHandle,
        gain: f32,
    ) -> Result<SourceHandle, AudioError> {
        let source = backend.create_source()?;
        let configured = backend
            .bind_buffer(source, buffer)
            .and_then(|()| backend.set_gain(source, gain));

        if let Err(e) = configured {
            backend.destroy_source(source);
            return Err(e);
        }
        Ok(source)
    }

    /// Start the first idle voice, or steal the one furthest into its playback
    ///
    /// When every voice is playing, each voice's elapsed offset is queried and
    /// the voice with the greatest offset is restarted from the beginning. Ties
    /// go to the earliest voice in pool order.
    pub fn play<B: AudioBackend + ?Sized>(
        &self,
        backend: &mut B,
        asset_id: &str,
    ) -> Result<PlayOutcome, AudioError> {
        let pool = self.pool_or_not_loaded(asset_id)?;
        let mut furthest: Option<(usize, f32)> = None;

        for (index, voice) in pool.voices.iter().enumerate() {
            if backend.query_state(voice.source) == SourceState::Idle {
                backend.play(voice.source)?;
                log::debug!("{asset_id}: started idle voice {index}");
                return Ok(PlayOutcome::Started(index));
            }

            let elapsed = backend.query_elapsed(voice.source);
            if furthest.map_or(true, |(_, best)| elapsed > best) {
                furthest = Some((index, elapsed));
            }
        }

        let (index, elapsed) = furthest.ok_or_else(|| {
            AudioError::InvalidArgument(format!("voice pool for {asset_id} is empty"))
        })?;
        backend.play(pool.voices[index].source)?;
        log::debug!("{asset_id}: all voices busy, restarted voice {index} at {elapsed:.3}s");
        Ok(PlayOutcome::Stolen(index))
    }

    /// Loop the last voice of the pool if it is not already playing
    pub fn loop_last<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        asset_id: &str,
    ) -> Result<LoopOutcome, AudioError> {
        let voice = self
            .pools
            .get_mut(asset_id)
            .and_then(|pool| pool.voices.last_mut())
            .ok_or_else(|| AudioError::NotLoaded(asset_id.to_string()))?;

        if backend.query_state(voice.source) == SourceState::Playing {
            return Ok(LoopOutcome::AlreadyPlaying);
        }

        backend.set_looping(voice.source, true)?;
        voice.looping = true;
        backend.play(voice.source)?;
        Ok(LoopOutcome::Started)
    }

    /// Stop every voice of an asset and clear their looping flags
    ///
    /// Every voice is attempted even if one fails; the first failure is
    /// returned.
    pub fn stop_all<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        asset_id: &str,
    ) -> Result<(), AudioError> {
        let pool = self
            .pools
            .get_mut(asset_id)
            .ok_or_else(|| AudioError::NotLoaded(asset_id.to_string()))?;

        let mut first_error = None;
        for voice in &mut pool.voices {
            let stopped = backend
                .stop(voice.source)
                .and_then(|()| backend.set_looping(voice.source, false));
            voice.looping = false;
            if let Err(e) = stopped {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop and destroy every voice of an asset and drop its pool
    ///
    /// Returns false if the asset had no pool.
    pub fn release_pool<B: AudioBackend + ?Sized>(&mut self, backend: &mut B, asset_id: &str) -> bool {
        let Some(pool) = self.pools.remove(asset_id) else {
            return false;
        };

        for voice in pool.voices {
            if let Err(e) = backend.stop(voice.source) {
                log::warn!("{asset_id}: failed to stop voice before destroying it: {e}");
            }
            backend.destroy_source(voice.source);
        }
        true
    }

    /// Drop a pool without touching the backend
    ///
    /// Used when the device that owned the sources is already gone.
    pub fn forget_pool(&mut self, asset_id: &str) -> bool {
        self.pools.remove(asset_id).is_some()
    }

    /// Pool of an asset
    pub fn pool(&self, asset_id: &str) -> Option<&VoicePool> {
        self.pools.get(asset_id)
    }

    /// Number of voices of an asset, 0 when it has no pool
    pub fn voice_count(&self, asset_id: &str) -> usize {
        self.pools.get(asset_id).map_or(0, VoicePool::len)
    }

    /// Number of assets with a pool
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    fn pool_or_not_loaded(&self, asset_id: &str) -> Result<&VoicePool, AudioError> {
        self.pools
            .get(asset_id)
            .ok_or_else(|| AudioError::NotLoaded(asset_id.to_string()))
    }
}

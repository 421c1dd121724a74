//! Core engine implementation
//!
//! [`AudioEngine`] is the playback controller: it owns the asset registry and
//! the voice pools, and routes every request through the shared output
//! device. Each request runs to completion while holding the device lock.

use crate::audio::asset_registry::{self, Asset, AssetRegistry, PreloadKind};
use crate::audio::backend::AudioBackend;
use crate::audio::lifecycle::{lock_device, DeviceLifecycleMonitor, SharedDevice};
use crate::audio::voice_manager::{LoopOutcome, PlayOutcome, VoiceManager, VoicePool};
use crate::audio::AudioError;
use crate::command::Command;
use crate::config::AudioConfig;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Successful outcome of an engine request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Asset decoded and its voices created
    Loaded(String),
    /// Asset was already loaded; nothing changed
    AlreadyLoaded(String),
    /// An idle voice was started
    Playing {
        /// Asset id
        id: String,
        /// Pool index of the started voice
        voice: usize,
    },
    /// Every voice was busy and the furthest-along one was restarted
    Overwriting {
        /// Asset id
        id: String,
        /// Pool index of the restarted voice
        voice: usize,
    },
    /// The last voice was started in looping mode
    Looping(String),
    /// The last voice was already playing; nothing changed
    AlreadyPlaying(String),
    /// Every voice of the asset was stopped
    Stopped(String),
    /// Loop or stop was requested for an effect loaded with `preloadFX`
    OneShotOnly(String),
    /// Asset and all its voices were released
    Unloaded(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(id) => write!(f, "File: <{id}> is loaded"),
            Self::AlreadyLoaded(id) => write!(f, "Already preloaded {id}"),
            Self::Playing { id, .. } => write!(f, "Playing {id}"),
            Self::Overwriting { .. } => write!(
                f,
                "Every single voice is currently being played, now overwriting previous ones"
            ),
            Self::Looping(id) => write!(f, "Looping {id}"),
            Self::AlreadyPlaying(id) => write!(f, "{id} is already playing"),
            Self::Stopped(id) => write!(f, "Stopped {id}"),
            Self::OneShotOnly(_) => write!(
                f,
                "Voices loaded via preloadFX are not intended to be looped or stopped."
            ),
            Self::Unloaded(id) => write!(f, "Unloading {id}"),
        }
    }
}

/// Registry, pools and the device generation their handles belong to
///
/// Kept apart from the device so a request can hold the device guard and
/// mutate this state at the same time.
#[derive(Debug, Default)]
struct EngineState {
    registry: AssetRegistry,
    voices: VoiceManager,
    generation: Option<u64>,
}

impl EngineState {
    /// Whether the stored handles refer to live objects on `backend`
    fn handles_live<B: AudioBackend>(&self, backend: &B) -> bool {
        backend.is_device_acquired() && self.generation == Some(backend.device_generation())
    }

    /// Open the device if needed and rebuild every asset on a new generation
    fn ensure_device<B: AudioBackend>(&mut self, backend: &mut B) -> Result<(), AudioError> {
        if !backend.is_device_acquired() {
            backend.acquire_device()?;
            log::info!("Audio device acquired");
        }

        let generation = backend.device_generation();
        if self.generation == Some(generation) {
            return Ok(());
        }

        if let Err(e) = self.rebuild(backend) {
            log::warn!("Rebuilding assets on the new device failed: {e}");
            backend.release_device();
            return Err(e);
        }
        self.generation = Some(generation);
        Ok(())
    }

    fn rebuild<B: AudioBackend>(&mut self, backend: &mut B) -> Result<(), AudioError> {
        if self.registry.is_empty() {
            return Ok(());
        }

        for asset in self.registry.iter_mut() {
            let buffer = backend.create_buffer(asset.audio())?;
            asset.set_buffer(buffer);
            self.voices.rebuild_pool(backend, asset.id(), buffer)?;
        }
        log::info!("Rebuilt {} asset(s) on the reopened device", self.registry.len());
        Ok(())
    }

    fn kind_of(&self, id: &str) -> Result<PreloadKind, AudioError> {
        self.registry
            .get(id)
            .map(Asset::kind)
            .ok_or_else(|| AudioError::NotLoaded(id.to_string()))
    }
}

/// Low-latency playback controller over an [`AudioBackend`]
#[derive(Debug)]
pub struct AudioEngine<B: AudioBackend + 'static> {
    device: SharedDevice<B>,
    state: EngineState,
    monitor: Option<DeviceLifecycleMonitor>,
    config: AudioConfig,
}

impl<B: AudioBackend + 'static> AudioEngine<B> {
    /// Create an engine over `backend`
    ///
    /// The device is not opened until the first request that needs it. When
    /// idle teardown is enabled the lifecycle monitor thread is started here.
    pub fn new(backend: B, config: AudioConfig) -> Result<Self, AudioError> {
        config
            .validate()
            .map_err(|e| AudioError::InvalidArgument(e.to_string()))?;

        let device = Arc::new(Mutex::new(backend));
        let monitor = if config.idle_teardown_enabled {
            Some(DeviceLifecycleMonitor::spawn(
                Arc::clone(&device),
                config.idle_teardown_delay(),
            )?)
        } else {
            None
        };

        log::info!(
            "Audio engine initialized (asset root {})",
            config.asset_root.display()
        );
        Ok(Self {
            device,
            state: EngineState::default(),
            monitor,
            config,
        })
    }

    /// Load a fire-and-forget effect with a single voice at the configured effect gain
    pub fn preload_fx(&mut self, id: &str, path: impl AsRef<Path>) -> Result<Status, AudioError> {
        let gain = self.config.effect_gain;
        self.preload(id, path.as_ref(), PreloadKind::Effect, gain, 1)
    }

    /// Load an asset with `voice_count` voices at a fixed `volume`
    pub fn preload_audio(
        &mut self,
        id: &str,
        path: impl AsRef<Path>,
        volume: f32,
        voice_count: usize,
    ) -> Result<Status, AudioError> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(AudioError::InvalidArgument(format!(
                "volume {volume} is not a non-negative gain"
            )));
        }
        if voice_count == 0 || voice_count > self.config.max_voices_per_asset {
            return Err(AudioError::InvalidArgument(format!(
                "voice count {voice_count} is outside 1..={}",
                self.config.max_voices_per_asset
            )));
        }
        self.preload(id, path.as_ref(), PreloadKind::Pooled, volume, voice_count)
    }

    fn preload(
        &mut self,
        id: &str,
        path: &Path,
        kind: PreloadKind,
        gain: f32,
        voice_count: usize,
    ) -> Result<Status, AudioError> {
        if self.state.registry.is_loaded(id) {
            let _backend = lock_device(&self.device)?;
            self.rearm_teardown();
            return Ok(Status::AlreadyLoaded(id.to_string()));
        }

        // Decoding needs no hardware and runs outside the device lock
        let resolved = self.config.resolve_asset_path(path);
        let audio = asset_registry::decode_file(id, &resolved)?;

        let mut backend = lock_device(&self.device)?;
        self.state.ensure_device(&mut *backend)?;

        let buffer = backend.create_buffer(&audio)?;
        if let Err(e) = self
            .state
            .voices
            .allocate_pool(&mut *backend, id, buffer, gain, voice_count)
        {
            backend.destroy_buffer(buffer);
            return Err(e);
        }
        self.state.registry.insert(Asset::new(id, buffer, audio, kind));

        self.rearm_teardown();
        log::info!("Loaded {id} from {} with {voice_count} voice(s)", resolved.display());
        Ok(Status::Loaded(id.to_string()))
    }

    /// Start an idle voice of `id`, stealing the furthest-along one if all are busy
    pub fn play(&mut self, id: &str) -> Result<Status, AudioError> {
        let mut backend = lock_device(&self.device)?;
        self.rearm_teardown();
        self.state.kind_of(id)?;
        self.state.ensure_device(&mut *backend)?;

        let status = match self.state.voices.play(&mut *backend, id)? {
            PlayOutcome::Started(voice) => Status::Playing {
                id: id.to_string(),
                voice,
            },
            PlayOutcome::Stolen(voice) => Status::Overwriting {
                id: id.to_string(),
                voice,
            },
        };
        Ok(status)
    }

    /// Loop the last voice of `id`
    pub fn loop_sound(&mut self, id: &str) -> Result<Status, AudioError> {
        let mut backend = lock_device(&self.device)?;
        self.rearm_teardown();
        if self.state.kind_of(id)? == PreloadKind::Effect {
            return Ok(Status::OneShotOnly(id.to_string()));
        }
        self.state.ensure_device(&mut *backend)?;

        let status = match self.state.voices.loop_last(&mut *backend, id)? {
            LoopOutcome::Started => Status::Looping(id.to_string()),
            LoopOutcome::AlreadyPlaying => Status::AlreadyPlaying(id.to_string()),
        };
        Ok(status)
    }

    /// Stop every voice of `id`
    ///
    /// Never reopens a released device: without a device nothing is playing.
    pub fn stop(&mut self, id: &str) -> Result<Status, AudioError> {
        let mut backend = lock_device(&self.device)?;
        self.rearm_teardown();
        if self.state.kind_of(id)? == PreloadKind::Effect {
            return Ok(Status::OneShotOnly(id.to_string()));
        }

        if self.state.handles_live(&*backend) {
            self.state.voices.stop_all(&mut *backend, id)?;
        }
        Ok(Status::Stopped(id.to_string()))
    }

    /// Release every voice and the buffer of `id` and forget it
    pub fn unload(&mut self, id: &str) -> Result<Status, AudioError> {
        let mut backend = lock_device(&self.device)?;
        self.rearm_teardown();

        let asset = self
            .state
            .registry
            .remove(id)
            .ok_or_else(|| AudioError::NotLoaded(id.to_string()))?;

        if self.state.handles_live(&*backend) {
            self.state.voices.release_pool(&mut *backend, id);
            backend.destroy_buffer(asset.buffer());
        } else {
            self.state.voices.forget_pool(id);
        }
        log::info!("Unloaded {id}");
        Ok(Status::Unloaded(id.to_string()))
    }

    /// Parse and run one protocol line, returning its status text
    ///
    /// Failures are reported as text as well; nothing here is fatal.
    pub fn execute(&mut self, line: &str) -> String {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => return e.to_string(),
        };

        match command.apply(self) {
            Ok(status) => status.to_string(),
            Err(e) => {
                log::debug!("'{}' failed: {e}", line.trim());
                e.to_string()
            }
        }
    }

    /// Check whether an asset is loaded
    pub fn is_loaded(&self, id: &str) -> bool {
        self.state.registry.is_loaded(id)
    }

    /// Loaded asset record
    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.state.registry.get(id)
    }

    /// Voice pool of an asset
    pub fn pool(&self, id: &str) -> Option<&VoicePool> {
        self.state.voices.pool(id)
    }

    /// Number of voices of an asset, 0 when not loaded
    pub fn voice_count(&self, id: &str) -> usize {
        self.state.voices.voice_count(id)
    }

    /// Run `f` with exclusive access to the backend
    ///
    /// Does not push the idle teardown out.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> Result<R, AudioError> {
        let mut backend = lock_device(&self.device)?;
        Ok(f(&mut *backend))
    }

    /// Idle teardown monitor, if enabled
    pub const fn monitor(&self) -> Option<&DeviceLifecycleMonitor> {
        self.monitor.as_ref()
    }

    /// Stop the monitor, release every asset and close the device
    pub fn shutdown(&mut self) {
        // The monitor may be waiting for the device lock
        if let Some(mut monitor) = self.monitor.take() {
            monitor.shutdown();
        }

        let Ok(mut backend) = lock_device(&self.device) else {
            log::error!("Audio device lock is poisoned, skipping device release");
            return;
        };
        for id in self.state.registry.ids() {
            self.state.voices.forget_pool(&id);
            self.state.registry.remove(&id);
        }
        self.state.generation = None;
        if backend.is_device_acquired() {
            backend.release_device();
            log::info!("Audio engine shut down");
        }
    }

    /// Push the idle teardown one grace period past this request
    fn rearm_teardown(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.arm();
        }
    }
}

impl<B: AudioBackend + 'static> Drop for AudioEngine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

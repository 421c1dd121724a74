//! Audio asset registry
//!
//! Maps asset ids to their decoded audio and the device buffer it was
//! uploaded into. The registry itself never talks to the backend; callers
//! create and destroy buffers and keep the records here in sync.

use crate::audio::backend::BufferHandle;
use crate::audio::decoder::{self, DecodedAudio};
use crate::audio::AudioError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// How an asset was preloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadKind {
    /// Fire-and-forget effect with a single full-gain voice
    Effect,
    /// Pooled asset with a caller-chosen voice count and gain
    Pooled,
}

/// A decoded asset and its device buffer
#[derive(Debug, Clone)]
pub struct Asset {
    id: String,
    buffer: BufferHandle,
    audio: DecodedAudio,
    kind: PreloadKind,
}

impl Asset {
    /// Create an asset record
    pub fn new(id: impl Into<String>, buffer: BufferHandle, audio: DecodedAudio, kind: PreloadKind) -> Self {
        Self {
            id: id.into(),
            buffer,
            audio,
            kind,
        }
    }

    /// Asset id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Device buffer holding the PCM data
    pub const fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Replace the device buffer after the device was reopened
    pub fn set_buffer(&mut self, buffer: BufferHandle) {
        self.buffer = buffer;
    }

    /// Decoded PCM data, kept for re-upload
    pub const fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    /// How the asset was preloaded
    pub const fn kind(&self) -> PreloadKind {
        self.kind
    }
}

/// Id to asset map
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: HashMap<String, Asset>,
}

impl AssetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether an asset is registered
    pub fn is_loaded(&self, id: &str) -> bool {
        self.assets.contains_key(id)
    }

    /// Look up an asset
    pub fn get(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }

    /// Register an asset, returning the record it replaced
    pub fn insert(&mut self, asset: Asset) -> Option<Asset> {
        self.assets.insert(asset.id.clone(), asset)
    }

    /// Remove an asset record
    pub fn remove(&mut self, id: &str) -> Option<Asset> {
        self.assets.remove(id)
    }

    /// Number of registered assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check whether no asset is registered
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Mutable iteration, used to swap buffers after a device rebuild
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Asset> {
        self.assets.values_mut()
    }

    /// Ids of registered assets, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.assets.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Read and decode an asset file
///
/// Does not touch the device, so it can run before the device lock is taken.
pub fn decode_file(id: &str, path: &Path) -> Result<DecodedAudio, AudioError> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AudioError::AssetNotFound {
            id: id.to_string(),
            path: path.to_path_buf(),
        },
        _ => AudioError::Io(e),
    })?;

    let audio = decoder::decode(&bytes).map_err(|source| AudioError::Decode {
        id: id.to_string(),
        source,
    })?;

    log::debug!(
        "Decoded {id}: {}, {} Hz, {} frames",
        audio.format(),
        audio.sample_rate(),
        audio.frame_count()
    );
    Ok(audio)
}

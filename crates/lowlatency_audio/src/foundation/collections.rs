//! Handle types and handle-keyed storage
//!
//! Backends hand out generational keys instead of raw ids. When a device is
//! released the backing maps are cleared, which bumps every slot version, so a
//! handle from an earlier device generation can never resolve to a newer object.

pub use slotmap::{Key, SlotMap};

slotmap::new_key_type! {
    /// Handle to a decoded PCM buffer uploaded to an audio backend
    pub struct BufferHandle;

    /// Handle to a playback source (one voice) on an audio backend
    pub struct SourceHandle;
}

/// Generational map keyed by a backend handle
pub type HandleMap<K, V> = SlotMap<K, V>;

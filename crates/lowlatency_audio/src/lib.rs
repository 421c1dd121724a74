//! # Low-latency audio
//!
//! A sound effect engine for interactive applications: assets are decoded
//! and uploaded once, each asset gets a fixed pool of voices, and triggering
//! a sound is a constant-time pick of an idle voice.
//!
//! ## Features
//!
//! - **WAV and Ogg Vorbis**: 8/16-bit PCM, mono or stereo
//! - **Voice pools**: per-asset voices with offset-based voice stealing
//! - **Idle teardown**: the output device is closed after a quiet period and
//!   transparently reopened on the next request
//! - **Pluggable backends**: rodio output or a deterministic simulated device
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lowlatency_audio::prelude::*;
//!
//! fn main() -> Result<(), AudioError> {
//!     let mut engine = AudioEngine::new(SimulatedBackend::new(), AudioConfig::default())?;
//!
//!     engine.preload_audio("boom", "boom.wav", 0.8, 3)?;
//!     engine.play("boom")?;
//!
//!     // The text protocol goes through the same engine
//!     println!("{}", engine.execute("stop boom"));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod audio;
pub mod command;
pub mod config;
pub mod foundation;

mod engine;

pub use engine::{AudioEngine, Status};

#[cfg(test)]
mod tests;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        audio::{AudioBackend, AudioError, DecodeError, PreloadKind, SimulatedBackend},
        command::{Command, CommandError},
        config::{AudioConfig, Config, ConfigError},
        AudioEngine, Status,
    };

    #[cfg(feature = "rodio-backend")]
    pub use crate::audio::backend::rodio_backend::RodioBackend;
}

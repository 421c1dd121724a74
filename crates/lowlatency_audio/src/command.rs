//! Text command protocol
//!
//! One request per line: `<verb> <arg1> <arg2> ...`, space-delimited.
//!
//! | verb           | arguments                        |
//! |----------------|----------------------------------|
//! | `preloadFX`    | id, path                         |
//! | `preloadAudio` | id, path, volume, voice count    |
//! | `play`         | id                               |
//! | `loop`         | id                               |
//! | `stop`         | id                               |
//! | `unload`       | id                               |
//!
//! The `preloadFX` path is the rest of the line, so it may contain spaces.

use crate::audio::backend::AudioBackend;
use crate::audio::AudioError;
use crate::engine::{AudioEngine, Status};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Command parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The line was blank
    #[error("Empty command")]
    Empty,

    /// The verb is not part of the protocol
    #[error("Command not found, choose either: preloadFX, preloadAudio, play, loop, stop, or unload")]
    UnknownVerb(String),

    /// A required argument is absent
    #[error("{verb} is missing its {argument} argument")]
    MissingArgument {
        /// Verb being parsed
        verb: &'static str,
        /// Name of the missing argument
        argument: &'static str,
    },

    /// A numeric argument did not parse
    #[error("{argument} must be a number, got '{value}'")]
    InvalidNumber {
        /// Name of the argument
        argument: &'static str,
        /// Text that failed to parse
        value: String,
    },
}

/// One parsed protocol request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Load a one-shot effect
    PreloadFx {
        /// Asset id
        id: String,
        /// File path, relative to the asset root unless absolute
        path: PathBuf,
    },
    /// Load a pooled asset
    PreloadAudio {
        /// Asset id
        id: String,
        /// File path, relative to the asset root unless absolute
        path: PathBuf,
        /// Fixed gain of every voice
        volume: f32,
        /// Number of voices
        voice_count: usize,
    },
    /// Play a voice
    Play(String),
    /// Loop the last voice
    Loop(String),
    /// Stop every voice
    Stop(String),
    /// Release the asset
    Unload(String),
}

impl Command {
    /// Run the command against an engine
    pub fn apply<B: AudioBackend + 'static>(
        self,
        engine: &mut AudioEngine<B>,
    ) -> Result<Status, AudioError> {
        match self {
            Self::PreloadFx { id, path } => engine.preload_fx(&id, path),
            Self::PreloadAudio {
                id,
                path,
                volume,
                voice_count,
            } => engine.preload_audio(&id, path, volume, voice_count),
            Self::Play(id) => engine.play(&id),
            Self::Loop(id) => engine.loop_sound(&id),
            Self::Stop(id) => engine.stop(&id),
            Self::Unload(id) => engine.unload(&id),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            "" => Err(CommandError::Empty),
            "preloadFX" => {
                let (id, path) = split_word(rest);
                Ok(Self::PreloadFx {
                    id: required("preloadFX", "id", id)?,
                    path: PathBuf::from(required("preloadFX", "path", path)?),
                })
            }
            "preloadAudio" => {
                let mut args = rest.split_whitespace();
                let id = required("preloadAudio", "id", args.next().unwrap_or(""))?;
                let path = required("preloadAudio", "path", args.next().unwrap_or(""))?;
                let volume = args.next().unwrap_or("");
                let voice_count = args.next().unwrap_or("");
                Ok(Self::PreloadAudio {
                    id,
                    path: PathBuf::from(path),
                    volume: number("preloadAudio", "volume", volume)?,
                    voice_count: number("preloadAudio", "voiceCount", voice_count)?,
                })
            }
            "play" => Ok(Self::Play(required("play", "id", rest)?)),
            "loop" => Ok(Self::Loop(required("loop", "id", rest)?)),
            "stop" => Ok(Self::Stop(required("stop", "id", rest)?)),
            "unload" => Ok(Self::Unload(required("unload", "id", rest)?)),
            other => Err(CommandError::UnknownVerb(other.to_string())),
        }
    }
}

fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

fn required(verb: &'static str, argument: &'static str, value: &str) -> Result<String, CommandError> {
    if value.is_empty() {
        Err(CommandError::MissingArgument { verb, argument })
    } else {
        Ok(value.to_string())
    }
}

fn number<T: FromStr>(verb: &'static str, argument: &'static str, value: &str) -> Result<T, CommandError> {
    if value.is_empty() {
        return Err(CommandError::MissingArgument { verb, argument });
    }
    value.parse().map_err(|_| CommandError::InvalidNumber {
        argument,
        value: value.to_string(),
    })
}

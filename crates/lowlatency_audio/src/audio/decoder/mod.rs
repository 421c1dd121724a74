//! Format decoders
//!
//! Both decoders produce the same thing: raw interleaved PCM bytes plus the
//! sample layout and rate needed to upload them to a backend buffer. The
//! container is picked from the magic bytes, never from the file extension.

pub mod ogg;
pub mod wav;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Decoder failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Container or chunk header missing or cut short
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Encoding, channel layout, bit depth or container is not supported
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Stream ended before the declared amount of data was read
    #[error("truncated file: {0}")]
    TruncatedFile(String),

    /// The codec itself reported a failure
    #[error("decode error: {0}")]
    Codec(String),
}

/// PCM sample layout of a decoded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// One channel, unsigned 8-bit samples
    Mono8,
    /// Two interleaved channels, unsigned 8-bit samples
    Stereo8,
    /// One channel, signed 16-bit little-endian samples
    Mono16,
    /// Two interleaved channels, signed 16-bit little-endian samples
    Stereo16,
}

impl SampleFormat {
    /// Map a channel count and bit depth to a supported layout
    pub const fn from_layout(channels: u16, bits_per_sample: u16) -> Option<Self> {
        match (channels, bits_per_sample) {
            (1, 8) => Some(Self::Mono8),
            (2, 8) => Some(Self::Stereo8),
            (1, 16) => Some(Self::Mono16),
            (2, 16) => Some(Self::Stereo16),
            _ => None,
        }
    }

    /// Number of interleaved channels
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 => 1,
            Self::Stereo8 | Self::Stereo16 => 2,
        }
    }

    /// Bits per single-channel sample
    pub const fn bits_per_sample(self) -> u16 {
        match self {
            Self::Mono8 | Self::Stereo8 => 8,
            Self::Mono16 | Self::Stereo16 => 16,
        }
    }

    /// Bytes per interleaved frame
    pub const fn bytes_per_frame(self) -> usize {
        self.channels() as usize * (self.bits_per_sample() as usize / 8)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = if self.channels() == 1 { "mono" } else { "stereo" };
        write!(f, "{layout} {}-bit", self.bits_per_sample())
    }
}

/// Decoded PCM ready to be handed to a backend
///
/// The sample bytes are reference counted so the asset registry can keep a
/// copy for rebuilding buffers without duplicating the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    pcm: Arc<[u8]>,
    format: SampleFormat,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Wrap raw PCM bytes with their layout
    pub fn new(pcm: Vec<u8>, format: SampleFormat, sample_rate: u32) -> Self {
        Self {
            pcm: pcm.into(),
            format,
            sample_rate,
        }
    }

    /// Raw interleaved PCM bytes
    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    /// Sample layout
    pub const fn format(&self) -> SampleFormat {
        self.format
    }

    /// Sample rate in Hz
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of complete frames in the buffer
    pub fn frame_count(&self) -> usize {
        self.pcm.len() / self.format.bytes_per_frame()
    }

    /// Playback length at the native sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }
}

/// Container formats recognised by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// RIFF/WAVE
    Wav,
    /// Ogg bitstream carrying Vorbis
    Ogg,
}

impl ContainerFormat {
    /// Detect the container from the first four bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes.get(0..4)? {
            b"RIFF" => Some(Self::Wav),
            b"OggS" => Some(Self::Ogg),
            _ => None,
        }
    }
}

/// Decode a complete in-memory file
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    match ContainerFormat::detect(bytes) {
        Some(ContainerFormat::Wav) => wav::decode(&mut std::io::Cursor::new(bytes)),
        Some(ContainerFormat::Ogg) => ogg::decode(bytes),
        None => {
            let magic = bytes.get(0..4).unwrap_or(bytes);
            Err(DecodeError::UnsupportedFormat(format!(
                "unrecognized container magic {magic:02x?}"
            )))
        }
    }
}

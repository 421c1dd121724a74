//! RIFF/WAVE decoder for 8- and 16-bit PCM
//!
//! Layout handled here:
//!
//! ```text
//! "RIFF" <u32 riff size> "WAVE"
//!   <tag:4> <u32 size> <body, padded to even length> ...
//! ```
//!
//! Chunks other than `fmt ` and `data` are skipped without being parsed.

use super::{DecodeError, DecodedAudio, SampleFormat};
use std::io::{self, Read, Seek, SeekFrom};

const PCM_FORMAT_CODE: u16 = 1;
const MIN_FMT_SIZE: u32 = 16;

/// Tag and declared size of one RIFF chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkHeader {
    tag: [u8; 4],
    size: u32,
}

impl ChunkHeader {
    fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let raw: [u8; 8] = read_array(reader)?;
        Ok(Self {
            tag: [raw[0], raw[1], raw[2], raw[3]],
            size: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }

    fn tag_name(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }

    /// Bytes occupied by the body, including the pad byte of odd-sized chunks
    fn padded_size(&self) -> i64 {
        i64::from(self.size) + i64::from(self.size & 1)
    }
}

/// Parsed `fmt ` chunk fields the decoder cares about
#[derive(Debug, Clone, Copy)]
struct FormatChunk {
    format: SampleFormat,
    sample_rate: u32,
}

/// Decode a WAV stream positioned at the `RIFF` magic
pub fn decode<R: Read + Seek>(reader: &mut R) -> Result<DecodedAudio, DecodeError> {
    read_riff_header(reader)?;
    let fmt = read_format(reader)?;
    let pcm = read_data(reader, fmt.format)?;

    log::trace!(
        "decoded WAV: {} @ {} Hz, {} bytes",
        fmt.format,
        fmt.sample_rate,
        pcm.len()
    );
    Ok(DecodedAudio::new(pcm, fmt.format, fmt.sample_rate))
}

fn read_riff_header<R: Read>(reader: &mut R) -> Result<(), DecodeError> {
    let header: [u8; 12] = read_array(reader)
        .map_err(|_| DecodeError::MalformedHeader("RIFF header is truncated".to_string()))?;

    if &header[0..4] != b"RIFF" {
        return Err(DecodeError::MalformedHeader("missing RIFF magic".to_string()));
    }
    if &header[8..12] != b"WAVE" {
        return Err(DecodeError::MalformedHeader(format!(
            "RIFF form type is {:?}, expected WAVE",
            String::from_utf8_lossy(&header[8..12])
        )));
    }
    Ok(())
}

/// Find and parse the `fmt ` chunk, skipping any chunks that precede it
fn read_format<R: Read + Seek>(reader: &mut R) -> Result<FormatChunk, DecodeError> {
    loop {
        let header = ChunkHeader::read(reader)
            .map_err(|_| DecodeError::MalformedHeader("missing fmt chunk".to_string()))?;

        match &header.tag {
            b"fmt " => return parse_format(reader, header),
            b"data" => {
                return Err(DecodeError::MalformedHeader(
                    "data chunk appears before fmt chunk".to_string(),
                ))
            }
            _ => skip_chunk(reader, &header)?,
        }
    }
}

fn parse_format<R: Read + Seek>(
    reader: &mut R,
    header: ChunkHeader,
) -> Result<FormatChunk, DecodeError> {
    if header.size < MIN_FMT_SIZE {
        return Err(DecodeError::MalformedHeader(format!(
            "fmt chunk is {} bytes, expected at least {MIN_FMT_SIZE}",
            header.size
        )));
    }

    let body: [u8; 16] = read_array(reader)
        .map_err(|_| DecodeError::MalformedHeader("fmt chunk is truncated".to_string()))?;

    let format_code = u16::from_le_bytes([body[0], body[1]]);
    if format_code != PCM_FORMAT_CODE {
        return Err(DecodeError::UnsupportedFormat(format!(
            "encoding {format_code:#06x} is not PCM"
        )));
    }

    let channels = u16::from_le_bytes([body[2], body[3]]);
    let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    // body[8..12] byte rate and body[12..14] block align are derived values
    let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);

    if sample_rate == 0 {
        return Err(DecodeError::MalformedHeader(
            "fmt chunk declares a sample rate of 0 Hz".to_string(),
        ));
    }

    let format = SampleFormat::from_layout(channels, bits_per_sample).ok_or_else(|| {
        DecodeError::UnsupportedFormat(format!(
            "{channels} channel(s) at {bits_per_sample} bits per sample"
        ))
    })?;

    let extra = header.padded_size() - i64::from(MIN_FMT_SIZE);
    if extra > 0 {
        reader
            .seek(SeekFrom::Current(extra))
            .map_err(|e| DecodeError::MalformedHeader(format!("cannot skip fmt extension: {e}")))?;
    }

    Ok(FormatChunk {
        format,
        sample_rate,
    })
}

/// Scan forward to the `data` chunk and read its declared contents
fn read_data<R: Read + Seek>(reader: &mut R, format: SampleFormat) -> Result<Vec<u8>, DecodeError> {
    loop {
        let header = ChunkHeader::read(reader).map_err(|_| {
            DecodeError::TruncatedFile("stream ended before a data chunk".to_string())
        })?;

        if &header.tag != b"data" {
            log::trace!("skipping '{}' chunk ({} bytes)", header.tag_name(), header.size);
            skip_chunk(reader, &header)?;
            continue;
        }

        let declared = usize::try_from(header.size).map_err(|_| {
            DecodeError::UnsupportedFormat(format!("data chunk of {} bytes is too large", header.size))
        })?;

        // Grow with the actual stream instead of trusting the header for the allocation
        let mut pcm = Vec::new();
        reader
            .by_ref()
            .take(u64::from(header.size))
            .read_to_end(&mut pcm)
            .map_err(|e| DecodeError::TruncatedFile(format!("reading data chunk failed: {e}")))?;

        if pcm.len() != declared {
            return Err(DecodeError::TruncatedFile(format!(
                "data chunk declares {declared} bytes but only {} are present",
                pcm.len()
            )));
        }
        if pcm.len() % format.bytes_per_frame() != 0 {
            log::warn!(
                "data chunk length {} is not a whole number of {} frames",
                pcm.len(),
                format
            );
        }
        return Ok(pcm);
    }
}

fn skip_chunk<R: Seek>(reader: &mut R, header: &ChunkHeader) -> Result<(), DecodeError> {
    reader
        .seek(SeekFrom::Current(header.padded_size()))
        .map(|_| ())
        .map_err(|e| {
            DecodeError::TruncatedFile(format!("cannot skip '{}' chunk: {e}", header.tag_name()))
        })
}

fn read_array<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::WavBuilder;
    use std::io::Cursor;

    fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
        decode(&mut Cursor::new(bytes))
    }

    #[test]
    fn test_mono_16_bit() {
        let bytes = WavBuilder::new(1, 44_100, 16).samples_16(&[0, 1000, -1000]).build();
        let audio = decode_bytes(&bytes).unwrap();

        assert_eq!(audio.format(), SampleFormat::Mono16);
        assert_eq!(audio.sample_rate(), 44_100);
        assert_eq!(audio.pcm(), &[0, 0, 0xE8, 0x03, 0x18, 0xFC]);
    }

    #[test]
    fn test_stereo_8_bit() {
        let bytes = WavBuilder::new(2, 11_025, 8).data(vec![128, 128, 0, 255]).build();
        let audio = decode_bytes(&bytes).unwrap();

        assert_eq!(audio.format(), SampleFormat::Stereo8);
        assert_eq!(audio.frame_count(), 2);
    }

    #[test]
    fn test_fmt_extension_bytes_are_skipped() {
        let bytes = WavBuilder::new(1, 8_000, 16)
            .fmt_extension(vec![0xAA; 6])
            .samples_16(&[7])
            .build();
        let audio = decode_bytes(&bytes).unwrap();
        assert_eq!(audio.pcm(), &[7, 0]);
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let bytes = WavBuilder::new(1, 8_000, 8)
            .chunk_before_fmt(*b"JUNK", vec![0; 4])
            .chunk(*b"LIST", b"INFOISFT".to_vec())
            .chunk(*b"odd ", vec![1, 2, 3])
            .data(vec![10, 20, 30])
            .build();
        let audio = decode_bytes(&bytes).unwrap();
        assert_eq!(audio.pcm(), &[10, 20, 30]);
    }

    #[test]
    fn test_missing_data_chunk_is_truncated() {
        let bytes = WavBuilder::new(1, 8_000, 16)
            .chunk(*b"LIST", vec![0; 8])
            .without_data()
            .build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::TruncatedFile(_))));
    }

    #[test]
    fn test_short_data_is_truncated() {
        let bytes = WavBuilder::new(1, 8_000, 16)
            .samples_16(&[1, 2, 3])
            .declared_data_len(64)
            .build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::TruncatedFile(_))));
    }

    #[test]
    fn test_chunk_size_past_end_is_truncated() {
        let bytes = WavBuilder::new(1, 8_000, 16)
            .chunk(*b"bext", vec![0; 2])
            .without_data()
            .build();
        let mut patched = bytes.clone();
        // Inflate the bext size so the skip lands beyond the end of the stream
        let bext = patched.windows(4).position(|w| w == b"bext").unwrap();
        patched[bext + 4..bext + 8].copy_from_slice(&1_000u32.to_le_bytes());
        assert!(matches!(decode_bytes(&patched), Err(DecodeError::TruncatedFile(_))));
    }

    #[test]
    fn test_non_pcm_is_unsupported() {
        let bytes = WavBuilder::new(1, 8_000, 16).format_code(3).samples_16(&[0]).build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_unsupported_layouts() {
        for (channels, bits) in [(1, 24), (2, 32), (3, 16), (0, 8)] {
            let bytes = WavBuilder::new(channels, 8_000, bits).data(vec![0; 12]).build();
            assert!(
                matches!(decode_bytes(&bytes), Err(DecodeError::UnsupportedFormat(_))),
                "{channels} channels / {bits} bits should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_fmt_is_malformed() {
        let bytes = WavBuilder::new(1, 8_000, 8).without_fmt().data(vec![1, 2]).build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::MalformedHeader(_))));

        let header_only = &WavBuilder::new(1, 8_000, 8).build()[..12];
        assert!(matches!(decode_bytes(header_only), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_zero_sample_rate_is_malformed() {
        let bytes = WavBuilder::new(1, 0, 16).samples_16(&[1, 2, 3, 4]).build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_short_fmt_is_malformed() {
        let bytes = WavBuilder::new(1, 8_000, 8).fmt_size(12).data(vec![1]).build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_truncated_fmt_body_is_malformed() {
        let bytes = WavBuilder::new(1, 8_000, 8).without_data().build();
        let cut = &bytes[..bytes.len() - 4];
        assert!(matches!(decode_bytes(cut), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_wrong_form_type_is_malformed() {
        let bytes = WavBuilder::new(1, 8_000, 8).form_type(*b"AVI ").data(vec![1]).build();
        assert!(matches!(decode_bytes(&bytes), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_empty_data_chunk_decodes_to_empty_buffer() {
        let bytes = WavBuilder::new(1, 8_000, 8).data(Vec::new()).build();
        let audio = decode_bytes(&bytes).unwrap();
        assert_eq!(audio.frame_count(), 0);
    }
}

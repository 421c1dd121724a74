//! Ogg Vorbis decoder
//!
//! Decoding is delegated to `lewton`; output is always interleaved signed
//! 16-bit little-endian PCM. The expected length comes from the granule
//! position of the last Ogg page, which for Vorbis is the total number of
//! PCM frames in the stream.

use super::{DecodeError, DecodedAudio, SampleFormat};
use lewton::inside_ogg::OggStreamReader;
use lewton::{OggReadError, VorbisError};
use std::io::{self, Cursor};

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
/// Fixed page header size, up to and including the segment count
const PAGE_HEADER_LEN: usize = 27;
/// Granule value meaning "no packet finishes on this page"
const NO_GRANULE: u64 = u64::MAX;
/// Cap on the up-front allocation, the header is not trusted beyond this
const MAX_PREALLOC_BYTES: usize = 64 * 1024 * 1024;

/// Decode a complete Ogg Vorbis file held in memory
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let mut reader = OggStreamReader::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::Codec(format!("cannot open Vorbis stream: {e}")))?;

    let channels = u16::from(reader.ident_hdr.audio_channels);
    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let format = SampleFormat::from_layout(channels, 16).ok_or_else(|| {
        DecodeError::UnsupportedFormat(format!("{channels}-channel Vorbis streams are not supported"))
    })?;

    let total_frames = last_granule_position(bytes).ok_or_else(|| {
        DecodeError::TruncatedFile("no Ogg page carries a granule position".to_string())
    })?;
    let total_len = usize::try_from(total_frames)
        .ok()
        .and_then(|frames| frames.checked_mul(format.bytes_per_frame()))
        .ok_or_else(|| {
            DecodeError::UnsupportedFormat(format!("{total_frames} frames do not fit in memory"))
        })?;

    if total_len == 0 {
        return Err(DecodeError::Codec("stream contains no samples".to_string()));
    }

    let mut pcm = Vec::with_capacity(total_len.min(MAX_PREALLOC_BYTES));
    while pcm.len() < total_len {
        match reader.read_dec_packet_itl() {
            Ok(Some(samples)) => {
                let remaining = (total_len - pcm.len()) / 2;
                for sample in samples.into_iter().take(remaining) {
                    pcm.extend_from_slice(&sample.to_le_bytes());
                }
            }
            Ok(None) => {
                return Err(DecodeError::TruncatedFile(format!(
                    "Vorbis stream ended after {} of {total_len} bytes",
                    pcm.len()
                )))
            }
            Err(VorbisError::OggError(OggReadError::ReadError(e)))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                return Err(DecodeError::TruncatedFile(format!(
                    "Vorbis stream cut off mid-page after {} of {total_len} bytes",
                    pcm.len()
                )))
            }
            Err(e) => return Err(DecodeError::Codec(format!("Vorbis packet decode failed: {e}"))),
        }
    }

    log::trace!("decoded Vorbis: {format} @ {sample_rate} Hz, {} bytes", pcm.len());
    Ok(DecodedAudio::new(pcm, format, sample_rate))
}

/// Granule position of the last Ogg page that has one
///
/// Pages are walked forward from the start using their segment tables, so
/// packet payload is never mistaken for a page header. A final page whose
/// body is cut short still counts: its header states how much audio the
/// stream was meant to hold.
pub fn last_granule_position(bytes: &[u8]) -> Option<u64> {
    let mut offset = 0;
    let mut last = None;

    while let Some(header) = bytes.get(offset..offset + PAGE_HEADER_LEN) {
        if &header[..4] != CAPTURE_PATTERN || header[4] != 0 {
            break;
        }
        let table_start = offset + PAGE_HEADER_LEN;
        let Some(segments) = bytes.get(table_start..table_start + usize::from(header[26])) else {
            break;
        };

        let mut granule = [0u8; 8];
        granule.copy_from_slice(&header[6..14]);
        let granule = u64::from_le_bytes(granule);
        if granule != NO_GRANULE {
            last = Some(granule);
        }

        let body_len: usize = segments.iter().map(|&len| usize::from(len)).sum();
        offset = table_start + segments.len() + body_len;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono 8 kHz silence: 1100 frames across two audio pages
    const SILENCE: &[u8] = include_bytes!("testdata/silence.ogg");

    /// Page with one packet; the checksum is left zero
    fn page(granule: u64, body: &[u8]) -> Vec<u8> {
        assert!(body.len() < 255);
        let mut page = Vec::new();
        page.extend_from_slice(CAPTURE_PATTERN);
        page.push(0); // version
        page.push(0); // header type
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&[0; 12]); // serial, sequence, checksum
        page.push(1);
        page.push(body.len() as u8);
        page.extend_from_slice(body);
        page
    }

    #[test]
    fn test_decodes_vorbis_to_16_bit_pcm() {
        let audio = decode(SILENCE).unwrap();

        assert_eq!(audio.format(), SampleFormat::Mono16);
        assert_eq!(audio.sample_rate(), 8_000);
        // The final granule cuts the last packet short of its 128 frames
        assert_eq!(audio.frame_count(), 1_100);
        assert_eq!(audio.pcm().len(), 2_200);
        assert!(audio.pcm().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decoding_is_repeatable() {
        let first = decode(SILENCE).unwrap();
        let second = decode(SILENCE).unwrap();
        assert_eq!(first.pcm(), second.pcm());
    }

    #[test]
    fn test_cut_stream_is_truncated() {
        let cut = &SILENCE[..SILENCE.len() - 3];
        assert!(matches!(decode(cut), Err(DecodeError::TruncatedFile(_))));
    }

    #[test]
    fn test_last_granule_position_of_real_stream() {
        assert_eq!(last_granule_position(SILENCE), Some(1_100));
    }

    #[test]
    fn test_last_granule_position_picks_final_page() {
        let mut stream = page(0, &[1, 2, 3]);
        stream.extend(page(4_410, &[]));
        stream.extend(page(88_200, &[9; 40]));
        assert_eq!(last_granule_position(&stream), Some(88_200));
    }

    #[test]
    fn test_last_granule_position_ignores_capture_pattern_in_payload() {
        let fake = page(999_999, &[]);
        let mut stream = page(0, &[]);
        stream.extend(page(2_048, &fake));
        assert_eq!(last_granule_position(&stream), Some(2_048));
    }

    #[test]
    fn test_last_granule_position_counts_cut_final_page() {
        let mut stream = page(512, &[0; 8]);
        stream.extend(page(1_024, &[0; 8]));
        stream.truncate(stream.len() - 4);
        assert_eq!(last_granule_position(&stream), Some(1_024));
    }

    #[test]
    fn test_last_granule_position_skips_unset_granules() {
        let mut stream = page(1_024, &[]);
        stream.extend(page(NO_GRANULE, &[5]));
        assert_eq!(last_granule_position(&stream), Some(1_024));
    }

    #[test]
    fn test_last_granule_position_without_pages() {
        assert_eq!(last_granule_position(b"OggS"), None);
        assert_eq!(last_granule_position(&[0; 64]), None);
    }

    #[test]
    fn test_garbage_stream_is_codec_error() {
        let mut stream = page(0, &[]);
        stream.extend_from_slice(b"definitely not a vorbis identification header");
        assert!(matches!(decode(&stream), Err(DecodeError::Codec(_))));
    }

    #[test]
    fn test_bare_capture_pattern_is_codec_error() {
        assert!(matches!(decode(b"OggS"), Err(DecodeError::Codec(_))));
    }
}

//! WebM/Opus demuxing for browser uploads.

use crate::error::{Result, VoxgateError};
use matroska_demuxer::{Frame, MatroskaFile, TrackType};
use opus::{Channels, Decoder};
use std::io::Cursor;

const OPUS_CODEC_ID: &str = "A_OPUS";

/// Largest Opus packet: 120 ms at 48 kHz.
const MAX_OPUS_FRAME: usize = 5760;

/// Decoder priming samples declared in the `OpusHead` codec private data.
fn pre_skip(codec_private: Option<&[u8]>) -> usize {
    match codec_private {
        Some(head) if head.len() >= 12 && head.starts_with(b"OpusHead") => {
            usize::from(u16::from_le_bytes([head[10], head[11]]))
        }
        _ => 0,
    }
}

/// Demuxes the first Opus track and decodes it to 48 kHz mono PCM, without
/// the encoder's priming samples.
pub fn decode_opus_mono(bytes: &[u8]) -> Result<Vec<i16>> {
    let mut mkv = MatroskaFile::open(Cursor::new(bytes)).map_err(|e| VoxgateError::Decode {
        message: format!("Failed to parse WebM container: {e}"),
    })?;

    let (track, skip) = mkv
        .tracks()
        .iter()
        .find(|t| t.track_type() == TrackType::Audio && t.codec_id() == OPUS_CODEC_ID)
        .map(|t| (t.track_number().get(), pre_skip(t.codec_private())))
        .ok_or_else(|| VoxgateError::Decode {
            message: "WebM container has no Opus audio track".to_string(),
        })?;

    // libopus downmixes stereo packets when the decoder is mono.
    let mut decoder =
        Decoder::new(crate::defaults::OPUS_SAMPLE_RATE, Channels::Mono).map_err(|e| {
            VoxgateError::Decode {
                message: format!("Failed to create Opus decoder: {e}"),
            }
        })?;

    let mut pcm = Vec::new();
    let mut scratch = vec![0i16; MAX_OPUS_FRAME];
    let mut frame = Frame::default();
    loop {
        let more = mkv.next_frame(&mut frame).map_err(|e| VoxgateError::Decode {
            message: format!("Failed to read WebM block: {e}"),
        })?;
        if !more {
            break;
        }
        if frame.track != track {
            continue;
        }
        let decoded = decoder
            .decode(&frame.data, &mut scratch, false)
            .map_err(|e| VoxgateError::Decode {
                message: format!("Failed to decode Opus packet: {e}"),
            })?;
        pcm.extend_from_slice(&scratch[..decoded]);
    }

    pcm.drain(..skip.min(pcm.len()));
    tracing::debug!(samples = pcm.len(), skipped = skip, "decoded WebM/Opus upload");
    Ok(pcm)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_skip_comes_from_opus_head() {
        assert_eq!(pre_skip(Some(fixture::opus_head(312).as_slice())), 312);
        assert_eq!(pre_skip(Some(&b"OpusTags........"[..])), 0);
        assert_eq!(pre_skip(Some(&b"OpusHead"[..])), 0);
        assert_eq!(pre_skip(None), 0);
    }

    #[test]
    fn opus_track_decodes_without_priming_samples() {
        let webm = fixture::opus_webm(&fixture::tone(10));
        let pcm = decode_opus_mono(&webm).unwrap();
        assert_eq!(
            pcm.len(),
            10 * fixture::FRAME_SAMPLES - usize::from(fixture::PRE_SKIP)
        );
        let peak = pcm.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 2_000, "peak {peak}");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            decode_opus_mono(&[]),
            Err(VoxgateError::Decode { .. })
        ));
    }

    #[test]
    fn non_ebml_input_is_rejected() {
        assert!(matches!(
            decode_opus_mono(b"RIFF....WAVEfmt "),
            Err(VoxgateError::Decode { .. })
        ));
    }
}

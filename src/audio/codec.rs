//! Wire-format conversions to and from canonical PCM.
//!
//! Ingress: WebM/Opus (browser), G.711 u-law (telephony), raw PCM or WAV.
//! Egress: WAV for the recognition capability and u-law for telephony replies.

use crate::audio::buffer::AudioBuffer;
use crate::defaults::{CHANNELS, SAMPLE_RATE, TELEPHONY_SAMPLE_RATE};
use crate::error::{Result, VoxgateError};
use crate::platform::Platform;
use std::io::Cursor;

/// Decodes inbound bytes for `platform` into canonical 16 kHz mono PCM.
pub fn decode(bytes: &[u8], platform: Platform) -> Result<AudioBuffer> {
    match platform {
        Platform::Web => decode_web(bytes),
        Platform::Telephony => {
            let pcm = decode_mulaw(bytes);
            let samples = resample(&pcm, TELEPHONY_SAMPLE_RATE, SAMPLE_RATE);
            Ok(AudioBuffer::canonical(&samples))
        }
        Platform::Raw => {
            if is_wav(bytes) {
                decode_wav(bytes)
            } else {
                AudioBuffer::from_pcm_bytes(bytes.to_vec(), SAMPLE_RATE, CHANNELS, 2)
            }
        }
    }
}

#[cfg(feature = "webm")]
fn decode_web(bytes: &[u8]) -> Result<AudioBuffer> {
    use crate::defaults::OPUS_SAMPLE_RATE;

    if is_wav(bytes) {
        return decode_wav(bytes);
    }
    let pcm = crate::audio::webm::decode_opus_mono(bytes)?;
    let samples = resample(&pcm, OPUS_SAMPLE_RATE, SAMPLE_RATE);
    Ok(AudioBuffer::canonical(&samples))
}

#[cfg(not(feature = "webm"))]
fn decode_web(bytes: &[u8]) -> Result<AudioBuffer> {
    if is_wav(bytes) {
        return decode_wav(bytes);
    }
    Err(VoxgateError::Decode {
        message: "WebM support not compiled in (enable the `webm` feature)".to_string(),
    })
}

/// Serializes a buffer into a RIFF/WAVE container carrying its own format.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: buffer.sample_width() * 8,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.data().len()));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| VoxgateError::Other(format!("Failed to start WAV container: {e}")))?;

    let write_err = |e: hound::Error| VoxgateError::Other(format!("Failed to write WAV sample: {e}"));
    match buffer.sample_width() {
        1 => {
            for &b in buffer.data() {
                writer
                    .write_sample((b as i16 - 128) as i8)
                    .map_err(write_err)?;
            }
        }
        _ => {
            for s in buffer.samples() {
                writer.write_sample(s).map_err(write_err)?;
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| VoxgateError::Other(format!("Failed to finalize WAV: {e}")))?;
    Ok(cursor.into_inner())
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Parses a WAV file of any integer or float format into canonical PCM.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| VoxgateError::Decode {
        message: format!("Failed to parse WAV file: {}", e),
    })?;

    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(VoxgateError::Decode {
            message: "WAV header declares zero channels".to_string(),
        });
    }

    let raw_samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits) if bits <= 16 => {
            let shift = 16 - bits;
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| v << shift))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
        (hound::SampleFormat::Int, bits) => {
            let shift = bits.saturating_sub(16);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()
        }
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>(),
    }
    .map_err(|e| VoxgateError::Decode {
        message: format!("Failed to read WAV samples: {}", e),
    })?;

    let mono = downmix_to_mono(&raw_samples, spec.channels);
    let samples = resample(&mono, spec.sample_rate, SAMPLE_RATE);
    Ok(AudioBuffer::canonical(&samples))
}

/// Averages interleaved channels into one.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Expands one G.711 u-law byte to linear 16-bit.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let u = !byte;
    let exponent = (u >> 4) & 0x07;
    let mantissa = (u & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if u & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Compresses one linear 16-bit sample to G.711 u-law.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign: u8 = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0
    };
    magnitude = magnitude.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

pub fn decode_mulaw(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| mulaw_to_linear(b)).collect()
}

pub fn encode_mulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| linear_to_mulaw(s)).collect()
}

/// Streaming s16le → 8 kHz u-law transcoder for telephony egress.
///
/// Input arrives in arbitrary byte chunks; an odd trailing byte and samples
/// that do not yet fill a decimation group are carried to the next push.
#[derive(Debug)]
pub struct MulawTranscoder {
    factor: usize,
    pending_byte: Option<u8>,
    carry: Vec<i16>,
}

impl MulawTranscoder {
    /// `source_rate` must be a whole multiple of 8 kHz.
    pub fn new(source_rate: u32) -> Result<Self> {
        if source_rate == 0 || source_rate % TELEPHONY_SAMPLE_RATE != 0 {
            return Err(VoxgateError::Other(format!(
                "cannot transcode {source_rate} Hz PCM to {TELEPHONY_SAMPLE_RATE} Hz u-law"
            )));
        }
        Ok(Self {
            factor: (source_rate / TELEPHONY_SAMPLE_RATE) as usize,
            pending_byte: None,
            carry: Vec::new(),
        })
    }

    /// Transcodes the next chunk of little-endian PCM bytes.
    pub fn push(&mut self, pcm: &[u8]) -> Vec<u8> {
        let mut bytes = pcm.iter().copied();
        if let Some(low) = self.pending_byte.take() {
            match bytes.next() {
                Some(high) => self.carry.push(i16::from_le_bytes([low, high])),
                None => {
                    self.pending_byte = Some(low);
                    return Vec::new();
                }
            }
        }
        loop {
            match (bytes.next(), bytes.next()) {
                (Some(low), Some(high)) => self.carry.push(i16::from_le_bytes([low, high])),
                (Some(low), None) => {
                    self.pending_byte = Some(low);
                    break;
                }
                _ => break,
            }
        }

        let whole = self.carry.len() - self.carry.len() % self.factor;
        let out = self.carry[..whole]
            .chunks_exact(self.factor)
            .map(|group| {
                let sum: i32 = group.iter().map(|&s| s as i32).sum();
                linear_to_mulaw((sum / self.factor as i32) as i16)
            })
            .collect();
        self.carry.drain(..whole);
        out
    }

    /// Flushes a partial decimation group, if any.
    pub fn finish(mut self) -> Vec<u8> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let sum: i32 = self.carry.iter().map(|&s| s as i32).sum();
        let avg = (sum / self.carry.len() as i32) as i16;
        self.carry.clear();
        vec![linear_to_mulaw(avg)]
    }
}

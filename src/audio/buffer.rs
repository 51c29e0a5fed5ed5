//! Immutable PCM container passed between pipeline stages.

use crate::defaults;
use crate::error::{Result, VoxgateError};

/// Interleaved linear PCM with its format always attached.
///
/// Width 2 is signed 16-bit little-endian, width 1 is unsigned 8-bit (the WAV
/// convention). Fields are private so a buffer cannot change format after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    data: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    sample_width: u16,
}

impl AudioBuffer {
    /// Wraps raw PCM bytes, validating the format.
    pub fn from_pcm_bytes(
        data: Vec<u8>,
        sample_rate: u32,
        channels: u16,
        sample_width: u16,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(VoxgateError::Decode {
                message: "sample rate must be positive".to_string(),
            });
        }
        if channels == 0 {
            return Err(VoxgateError::Decode {
                message: "channel count must be positive".to_string(),
            });
        }
        if !matches!(sample_width, 1 | 2) {
            return Err(VoxgateError::Decode {
                message: format!("unsupported sample width {sample_width} bytes"),
            });
        }
        let frame_bytes = channels as usize * sample_width as usize;
        if data.len() % frame_bytes != 0 {
            return Err(VoxgateError::Decode {
                message: format!(
                    "{} bytes is not a whole number of {}-byte frames",
                    data.len(),
                    frame_bytes
                ),
            });
        }
        Ok(Self {
            data,
            sample_rate,
            channels,
            sample_width,
        })
    }

    /// Builds a 16-bit buffer from interleaved samples.
    pub fn from_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            data,
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            sample_width: 2,
        }
    }

    /// Builds a canonical (16 kHz mono 16-bit) buffer.
    pub fn canonical(samples: &[i16]) -> Self {
        Self::from_samples(samples, defaults::SAMPLE_RATE, defaults::CHANNELS)
    }

    /// Interleaved samples widened to 16-bit.
    pub fn samples(&self) -> Vec<i16> {
        match self.sample_width {
            1 => self
                .data
                .iter()
                .map(|&b| ((b as i16) - 128) << 8)
                .collect(),
            _ => self
                .data
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_width(&self) -> u16 {
        self.sample_width
    }

    /// Number of sample frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        self.data.len() / (self.channels as usize * self.sample_width as usize)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.frame_count() as u64 * 1000) / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True for 16 kHz mono 16-bit audio.
    pub fn is_canonical(&self) -> bool {
        self.sample_rate == defaults::SAMPLE_RATE
            && self.channels == defaults::CHANNELS
            && self.sample_width == defaults::SAMPLE_WIDTH
    }

    /// Returns a buffer with the same format and new 16-bit samples.
    pub(crate) fn with_samples(&self, samples: &[i16]) -> Self {
        Self::from_samples(samples, self.sample_rate, self.channels)
    }

    /// Copies sample frames `start..end`, clamped to the buffer.
    pub(crate) fn slice_frames(&self, start: usize, end: usize) -> Self {
        let frame_bytes = self.channels as usize * self.sample_width as usize;
        let end = end.min(self.frame_count());
        let start = start.min(end);
        Self {
            data: self.data[start * frame_bytes..end * frame_bytes].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_width: self.sample_width,
        }
    }

    /// Whether two buffers can be concatenated.
    pub fn same_format(&self, other: &AudioBuffer) -> bool {
        self.sample_rate == other.sample_rate
            && self.channels == other.channels
            && self.sample_width == other.sample_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_samples_roundtrips_values() {
        let buffer = AudioBuffer::from_samples(&[0, 1, -1, i16::MAX, i16::MIN], 16000, 1);
        assert_eq!(buffer.samples(), vec![0, 1, -1, i16::MAX, i16::MIN]);
        assert_eq!(buffer.sample_width(), 2);
        assert_eq!(buffer.data().len(), 10);
    }

    #[test]
    fn frame_count_accounts_for_channels() {
        let buffer = AudioBuffer::from_samples(&[0; 3200], 16000, 2);
        assert_eq!(buffer.frame_count(), 1600);
        assert_eq!(buffer.duration_ms(), 100);
    }

    #[test]
    fn canonical_buffer_is_canonical() {
        let buffer = AudioBuffer::canonical(&[0; 160]);
        assert!(buffer.is_canonical());
        assert_eq!(buffer.duration_ms(), 10);
        assert!(!AudioBuffer::from_samples(&[0; 160], 8000, 1).is_canonical());
    }

    #[test]
    fn rejects_partial_frames() {
        let result = AudioBuffer::from_pcm_bytes(vec![0; 3], 16000, 1, 2);
        assert!(matches!(result, Err(VoxgateError::Decode { .. })));
    }

    #[test]
    fn rejects_zero_rate_and_channels() {
        assert!(AudioBuffer::from_pcm_bytes(vec![0; 2], 0, 1, 2).is_err());
        assert!(AudioBuffer::from_pcm_bytes(vec![0; 2], 16000, 0, 2).is_err());
        assert!(AudioBuffer::from_pcm_bytes(vec![0; 3], 16000, 1, 3).is_err());
    }

    #[test]
    fn eight_bit_samples_are_widened() {
        let buffer = AudioBuffer::from_pcm_bytes(vec![128, 255, 0], 8000, 1, 1).unwrap();
        assert_eq!(buffer.samples(), vec![0, 127 << 8, -128 << 8]);
    }

    #[test]
    fn slice_frames_clamps_to_bounds() {
        let buffer = AudioBuffer::from_samples(&[1, 2, 3, 4, 5, 6], 16000, 2);
        assert_eq!(buffer.slice_frames(1, 2).samples(), vec![3, 4]);
        assert_eq!(buffer.slice_frames(2, 99).samples(), vec![5, 6]);
        assert!(buffer.slice_frames(5, 9).is_empty());
    }

    #[test]
    fn same_format_compares_all_fields() {
        let a = AudioBuffer::from_samples(&[0; 4], 16000, 1);
        let b = AudioBuffer::from_samples(&[1; 8], 16000, 1);
        let c = AudioBuffer::from_samples(&[1; 8], 8000, 1);
        assert!(a.same_format(&b));
        assert!(!a.same_format(&c));
    }
}

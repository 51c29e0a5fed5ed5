//! Loudness normalization, low-pass noise suppression and silence splitting.
//!
//! All operations are pure functions of their input buffer and run on the
//! blocking pool when called from the coordinator.

use crate::audio::buffer::AudioBuffer;
use crate::defaults;
use crate::error::{Result, VoxgateError};

/// Tunables for [`SpeechSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    /// Windows at or below this loudness count as silence (dBFS).
    pub silence_threshold_dbfs: f32,
    /// Shortest silent run that splits the clip (milliseconds).
    pub min_silence_ms: u32,
    /// Silence kept on each side of a voiced segment (milliseconds).
    pub keep_silence_ms: u32,
    /// Low-pass cutoff for [`SpeechSegmenter::suppress_noise`] (Hz).
    pub low_pass_cutoff_hz: f32,
    /// Distance of the normalized peak below full scale (dB).
    pub normalize_headroom_db: f32,
    /// Loudness analysis window (milliseconds).
    pub frame_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_threshold_dbfs: defaults::SILENCE_THRESHOLD_DBFS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            keep_silence_ms: defaults::KEEP_SILENCE_MS,
            low_pass_cutoff_hz: defaults::LOW_PASS_CUTOFF_HZ,
            normalize_headroom_db: defaults::NORMALIZE_HEADROOM_DB,
            frame_ms: defaults::ANALYSIS_FRAME_MS,
        }
    }
}

/// Root-mean-square loudness relative to full scale.
///
/// Returns negative infinity for digital silence or an empty slice.
pub fn dbfs(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();
    if rms == 0.0 {
        return f32::NEG_INFINITY;
    }
    (20.0 * (rms / 32768.0).log10()) as f32
}

#[derive(Debug, Clone, Default)]
pub struct SpeechSegmenter {
    config: SegmenterConfig,
}

impl SpeechSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Scales the clip so its peak sits `normalize_headroom_db` below full scale.
    pub fn normalize(&self, buffer: &AudioBuffer) -> AudioBuffer {
        let samples = buffer.samples();
        let peak = samples.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0);
        if peak == 0 {
            return buffer.clone();
        }

        let target = i16::MAX as f64 * 10f64.powf(-(self.config.normalize_headroom_db as f64) / 20.0);
        let gain = target / peak as f64;
        let scaled: Vec<i16> = samples
            .iter()
            .map(|&s| (s as f64 * gain).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
            .collect();
        buffer.with_samples(&scaled)
    }

    /// First-order RC low-pass, applied per channel.
    pub fn suppress_noise(&self, buffer: &AudioBuffer) -> AudioBuffer {
        let samples = buffer.samples();
        if samples.is_empty() || self.config.low_pass_cutoff_hz <= 0.0 {
            return buffer.clone();
        }

        let rc = 1.0 / (2.0 * std::f64::consts::PI * self.config.low_pass_cutoff_hz as f64);
        let dt = 1.0 / buffer.sample_rate() as f64;
        let alpha = dt / (rc + dt);

        let channels = buffer.channels() as usize;
        let mut filtered = samples.clone();
        for channel in 0..channels {
            let mut last = samples[channel] as f64;
            for i in (channel + channels..samples.len()).step_by(channels) {
                last += alpha * (samples[i] as f64 - last);
                filtered[i] = last.round() as i16;
            }
        }
        buffer.with_samples(&filtered)
    }

    /// Splits on silence using the configured threshold and minimum run.
    pub fn segment(&self, buffer: &AudioBuffer) -> Vec<AudioBuffer> {
        self.segment_with(
            buffer,
            self.config.silence_threshold_dbfs,
            self.config.min_silence_ms,
        )
    }

    /// Splits `buffer` at runs of at least `min_silence_ms` whose loudness is
    /// at or below `silence_threshold_dbfs`.
    ///
    /// Each voiced range keeps `keep_silence_ms` of context on both sides;
    /// where neighbouring pads overlap they meet at the midpoint. Returns an
    /// empty vector when no window rises above the threshold.
    pub fn segment_with(
        &self,
        buffer: &AudioBuffer,
        silence_threshold_dbfs: f32,
        min_silence_ms: u32,
    ) -> Vec<AudioBuffer> {
        let total = buffer.frame_count();
        if total == 0 {
            return Vec::new();
        }

        let rate = buffer.sample_rate() as usize;
        let channels = buffer.channels() as usize;
        let frame_ms = self.config.frame_ms.max(1);
        let window = (rate * frame_ms as usize / 1000).max(1);
        let min_windows = min_silence_ms.div_ceil(frame_ms).max(1) as usize;

        let samples = buffer.samples();
        let loud: Vec<bool> = samples
            .chunks(window * channels)
            .map(|w| dbfs(w) > silence_threshold_dbfs)
            .collect();
        if !loud.iter().any(|&l| l) {
            return Vec::new();
        }

        let mut voiced = Vec::new();
        let mut start = 0usize;
        let mut i = 0usize;
        while i < loud.len() {
            if loud[i] {
                i += 1;
                continue;
            }
            let run_start = i;
            while i < loud.len() && !loud[i] {
                i += 1;
            }
            if i - run_start >= min_windows {
                if run_start > start {
                    voiced.push((start, run_start));
                }
                start = i;
            }
        }
        if start < loud.len() {
            voiced.push((start, loud.len()));
        }

        let keep = rate * self.config.keep_silence_ms as usize / 1000;
        let mut ranges: Vec<(usize, usize)> = voiced
            .into_iter()
            .map(|(s, e)| {
                let s = (s * window).saturating_sub(keep);
                let e = (e * window + keep).min(total);
                (s, e)
            })
            .collect();
        for k in 1..ranges.len() {
            let (prev_end, next_start) = (ranges[k - 1].1, ranges[k].0);
            if next_start < prev_end {
                let mid = (prev_end + next_start) / 2;
                ranges[k - 1].1 = mid;
                ranges[k].0 = mid;
            }
        }

        tracing::debug!(
            segments = ranges.len(),
            windows = loud.len(),
            threshold = silence_threshold_dbfs,
            "segmented clip"
        );

        ranges
            .into_iter()
            .map(|(s, e)| buffer.slice_frames(s, e))
            .collect()
    }

    /// Concatenates segments in order.
    ///
    /// An empty input is [`VoxgateError::NoSpeechDetected`], never an empty buffer.
    pub fn recombine(segments: &[AudioBuffer]) -> Result<AudioBuffer> {
        let Some(first) = segments.first() else {
            return Err(VoxgateError::NoSpeechDetected);
        };
        if let Some(odd) = segments.iter().find(|s| !s.same_format(first)) {
            return Err(VoxgateError::Other(format!(
                "cannot recombine {} Hz/{} ch segment with {} Hz/{} ch audio",
                odd.sample_rate(),
                odd.channels(),
                first.sample_rate(),
                first.channels()
            )));
        }

        let mut data = Vec::with_capacity(segments.iter().map(|s| s.data().len()).sum());
        for segment in segments {
            data.extend_from_slice(segment.data());
        }
        AudioBuffer::from_pcm_bytes(
            data,
            first.sample_rate(),
            first.channels(),
            first.sample_width(),
        )
    }

    /// Normalize, suppress noise, segment and recombine in one call.
    pub fn process(&self, buffer: &AudioBuffer) -> Result<AudioBuffer> {
        let normalized = self.normalize(buffer);
        let filtered = self.suppress_noise(&normalized);
        Self::recombine(&self.segment(&filtered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(ms: u32, amplitude: f64) -> Vec<i16> {
        let n = (defaults::SAMPLE_RATE * ms / 1000) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / defaults::SAMPLE_RATE as f64;
                (amplitude * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as i16
            })
            .collect()
    }

    fn silence(ms: u32) -> Vec<i16> {
        vec![0; (defaults::SAMPLE_RATE * ms / 1000) as usize]
    }

    fn clip(parts: &[Vec<i16>]) -> AudioBuffer {
        AudioBuffer::canonical(&parts.concat())
    }

    #[test]
    fn dbfs_of_silence_is_negative_infinity() {
        assert_eq!(dbfs(&[0; 160]), f32::NEG_INFINITY);
        assert_eq!(dbfs(&[]), f32::NEG_INFINITY);
    }

    #[test]
    fn dbfs_of_full_scale_square_is_near_zero() {
        let level = dbfs(&[i16::MIN; 160]);
        assert!(level.abs() < 0.01, "{level}");
    }

    #[test]
    fn normalize_scales_peak_to_headroom() {
        let segmenter = SpeechSegmenter::default();
        let out = segmenter.normalize(&AudioBuffer::canonical(&[1000, -2000, 500]));
        let peak = out.samples().iter().map(|&s| (s as i32).abs()).max().unwrap();
        assert!((32300..=32400).contains(&peak), "{peak}");
        assert!(out.samples()[1] < 0);
    }

    #[test]
    fn normalize_passes_silence_through() {
        let segmenter = SpeechSegmenter::default();
        let input = AudioBuffer::canonical(&[0; 320]);
        assert_eq!(segmenter.normalize(&input), input);
    }

    #[test]
    fn suppress_noise_attenuates_nyquist_content() {
        let segmenter = SpeechSegmenter::default();
        let buzz: Vec<i16> = (0..1600).map(|i| if i % 2 == 0 { 10000 } else { -10000 }).collect();
        let out = segmenter.suppress_noise(&AudioBuffer::canonical(&buzz));
        assert!(dbfs(&out.samples()[100..]) < dbfs(&buzz) - 6.0);
    }

    #[test]
    fn suppress_noise_keeps_format() {
        let segmenter = SpeechSegmenter::default();
        let input = AudioBuffer::from_samples(&[100; 64], 8000, 2);
        let out = segmenter.suppress_noise(&input);
        assert!(out.same_format(&input));
        assert_eq!(out.frame_count(), 32);
    }

    #[test]
    fn silence_yields_no_segments() {
        let segmenter = SpeechSegmenter::default();
        assert!(segmenter.segment(&clip(&[silence(2000)])).is_empty());
        assert!(segmenter.segment(&AudioBuffer::canonical(&[])).is_empty());
    }

    #[test]
    fn quiet_noise_below_threshold_yields_no_segments() {
        let segmenter = SpeechSegmenter::default();
        // About -59 dBFS.
        assert!(segmenter.segment(&clip(&[tone(1000, 50.0)])).is_empty());
    }

    #[test]
    fn continuous_speech_is_one_segment() {
        let segmenter = SpeechSegmenter::default();
        let segments = segmenter.segment(&clip(&[tone(2000, 10000.0)]));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].frame_count(), 32000);
    }

    #[test]
    fn long_gap_splits_and_keeps_padding() {
        let segmenter = SpeechSegmenter::default();
        let input = clip(&[tone(1000, 10000.0), silence(1000), tone(1000, 10000.0)]);
        let segments = segmenter.segment(&input);
        assert_eq!(segments.len(), 2);
        // 1000 ms of speech plus 200 ms of kept silence on the inner side.
        assert_eq!(segments[0].duration_ms(), 1200);
        assert_eq!(segments[1].duration_ms(), 1200);
    }

    #[test]
    fn short_gap_does_not_split() {
        let segmenter = SpeechSegmenter::default();
        let input = clip(&[tone(500, 10000.0), silence(300), tone(500, 10000.0)]);
        let segments = segmenter.segment(&input);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].duration_ms(), 1300);
    }

    #[test]
    fn leading_and_trailing_silence_is_trimmed_to_padding() {
        let segmenter = SpeechSegmenter::default();
        let input = clip(&[silence(1000), tone(1000, 10000.0), silence(1000)]);
        let segments = segmenter.segment(&input);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].duration_ms(), 1400);
    }

    #[test]
    fn overlapping_padding_meets_at_midpoint() {
        let segmenter = SpeechSegmenter::new(SegmenterConfig {
            keep_silence_ms: 400,
            ..SegmenterConfig::default()
        });
        let input = clip(&[tone(1000, 10000.0), silence(600), tone(1000, 10000.0)]);
        let segments = segmenter.segment(&input);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].duration_ms(), 1300);
        assert_eq!(segments[1].duration_ms(), 1300);
        assert_eq!(
            segments[0].frame_count() + segments[1].frame_count(),
            input.frame_count()
        );
    }

    #[test]
    fn segment_with_overrides_threshold() {
        let segmenter = SpeechSegmenter::default();
        let input = clip(&[tone(1000, 50.0)]);
        assert_eq!(segmenter.segment_with(&input, -70.0, 500).len(), 1);
    }

    #[test]
    fn recombine_empty_is_no_speech() {
        assert!(matches!(
            SpeechSegmenter::recombine(&[]),
            Err(VoxgateError::NoSpeechDetected)
        ));
    }

    #[test]
    fn recombine_concatenates_in_order() {
        let a = AudioBuffer::canonical(&[1, 2]);
        let b = AudioBuffer::canonical(&[3]);
        let joined = SpeechSegmenter::recombine(&[a, b]).unwrap();
        assert_eq!(joined.samples(), vec![1, 2, 3]);
    }

    #[test]
    fn recombine_rejects_mixed_formats() {
        let a = AudioBuffer::canonical(&[1, 2]);
        let b = AudioBuffer::from_samples(&[3], 8000, 1);
        assert!(matches!(
            SpeechSegmenter::recombine(&[a, b]),
            Err(VoxgateError::Other(_))
        ));
    }

    #[test]
    fn process_on_silence_is_no_speech() {
        let segmenter = SpeechSegmenter::default();
        assert!(matches!(
            segmenter.process(&clip(&[silence(1000)])),
            Err(VoxgateError::NoSpeechDetected)
        ));
    }

    #[test]
    fn process_on_speech_keeps_canonical_format() {
        let segmenter = SpeechSegmenter::default();
        let out = segmenter.process(&clip(&[tone(2000, 3000.0)])).unwrap();
        assert!(out.is_canonical());
        assert_eq!(out.duration_ms(), 2000);
    }
}

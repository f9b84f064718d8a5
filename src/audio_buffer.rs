use crate::error::SpliceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// Sample rate and channel layout shared by every buffer that gets joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        AudioFormat {
            sample_rate,
            channels,
        }
    }

    /// Number of whole frames covered by `ms` milliseconds (rounded down).
    /// Saturates at `usize::MAX` rather than wrapping.
    pub fn ms_to_frames(&self, ms: u64) -> usize {
        usize::try_from(ms as u128 * self.sample_rate as u128 / 1000).unwrap_or(usize::MAX)
    }

    /// Length in milliseconds of `frames` frames (rounded down).
    pub fn frames_to_ms(&self, frames: usize) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (frames as u128 * 1000 / self.sample_rate as u128) as u64
    }

    fn stride(&self) -> usize {
        self.channels.max(1) as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz / {} ch", self.sample_rate, self.channels)
    }
}

/// Interleaved f32 PCM audio with value semantics.
///
/// Every operation returns a new buffer and leaves `self` untouched. Slices
/// share the underlying storage, so cutting a long recording into pieces does
/// not copy it; fades, overlays and joins allocate.
#[derive(Clone)]
pub struct AudioBuffer {
    data: Arc<Vec<f32>>,
    /// First sample of this view inside `data`.
    offset: usize,
    frames: usize,
    format: AudioFormat,
}

impl AudioBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn from_interleaved(mut samples: Vec<f32>, format: AudioFormat) -> Self {
        let frames = samples.len() / format.stride();
        samples.truncate(frames * format.stride());
        AudioBuffer {
            data: Arc::new(samples),
            offset: 0,
            frames,
            format,
        }
    }

    /// Zero-length buffer in the given format.
    pub fn empty(format: AudioFormat) -> Self {
        Self::from_interleaved(Vec::new(), format)
    }

    /// Digital silence of the given length.
    pub fn silent(format: AudioFormat, ms: u64) -> Self {
        let frames = format.ms_to_frames(ms);
        Self::from_interleaved(vec![0.0; frames * format.stride()], format)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Length in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.format.frames_to_ms(self.frames)
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.format.sample_rate as f64)
    }

    /// The interleaved samples of this view.
    pub fn samples(&self) -> &[f32] {
        let stride = self.format.stride();
        &self.data[self.offset..self.offset + self.frames * stride]
    }

    /// Frames `range`, clamped to the buffer. Shares storage with `self`.
    pub fn slice_frames(&self, range: Range<usize>) -> AudioBuffer {
        let start = range.start.min(self.frames);
        let end = range.end.clamp(start, self.frames);
        AudioBuffer {
            data: Arc::clone(&self.data),
            offset: self.offset + start * self.format.stride(),
            frames: end - start,
            format: self.format,
        }
    }

    /// Milliseconds `[start_ms, end_ms)`, clamped to the buffer.
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> AudioBuffer {
        let start = self.format.ms_to_frames(start_ms);
        let end = self.format.ms_to_frames(end_ms);
        self.slice_frames(start..end)
    }

    /// The first `frames` frames.
    pub fn head(&self, frames: usize) -> AudioBuffer {
        self.slice_frames(0..frames)
    }

    /// The last `frames` frames.
    pub fn tail(&self, frames: usize) -> AudioBuffer {
        self.slice_frames(self.frames.saturating_sub(frames)..self.frames)
    }

    /// Frames in reverse order. Channel order inside each frame is preserved.
    pub fn reverse(&self) -> AudioBuffer {
        let stride = self.format.stride();
        let mut out = Vec::with_capacity(self.frames * stride);
        for frame in self.samples().chunks_exact(stride).rev() {
            out.extend_from_slice(frame);
        }
        Self::from_interleaved(out, self.format)
    }

    /// Linear fade from silence over the first `ms` milliseconds.
    pub fn fade_in(&self, ms: u64) -> AudioBuffer {
        let n = self.format.ms_to_frames(ms).min(self.frames);
        self.with_gain(|i| if i < n { i as f32 / n as f32 } else { 1.0 })
    }

    /// Linear fade to silence over the last `ms` milliseconds.
    pub fn fade_out(&self, ms: u64) -> AudioBuffer {
        let n = self.format.ms_to_frames(ms).min(self.frames);
        let start = self.frames - n;
        self.with_gain(|i| {
            if i < start {
                1.0
            } else {
                1.0 - (i - start) as f32 / n as f32
            }
        })
    }

    /// Scale every frame by `gain(frame_index)`.
    fn with_gain<F>(&self, gain: F) -> AudioBuffer
    where
        F: Fn(usize) -> f32,
    {
        let stride = self.format.stride();
        let mut out = Vec::with_capacity(self.frames * stride);
        for (i, frame) in self.samples().chunks_exact(stride).enumerate() {
            let g = gain(i);
            out.extend(frame.iter().map(|s| s * g));
        }
        Self::from_interleaved(out, self.format)
    }

    /// Mix `other` on top of `self`, sample by sample, clipping to `[-1, 1]`.
    ///
    /// The result keeps the length of `self`; a shorter `other` only covers
    /// the start, a longer one is cut.
    pub fn overlay(&self, other: &AudioBuffer) -> Result<AudioBuffer, SpliceError> {
        self.check_format(other, "overlay")?;
        let mut out = self.samples().to_vec();
        for (a, b) in out.iter_mut().zip(other.samples()) {
            *a = (*a + *b).clamp(-1.0, 1.0);
        }
        Ok(Self::from_interleaved(out, self.format))
    }

    /// `self` followed by `other`.
    pub fn concat(&self, other: &AudioBuffer) -> Result<AudioBuffer, SpliceError> {
        Self::join(self.format, [self, other])
    }

    /// Concatenate `parts` in order onto an empty buffer of `format`.
    pub fn join<'a, I>(format: AudioFormat, parts: I) -> Result<AudioBuffer, SpliceError>
    where
        I: IntoIterator<Item = &'a AudioBuffer>,
    {
        let parts: Vec<&AudioBuffer> = parts.into_iter().collect();
        let seed = AudioBuffer::empty(format);
        for part in &parts {
            seed.check_format(part, "concatenate")?;
        }
        let total: usize = parts.iter().map(|p| p.samples().len()).sum();
        let mut out = Vec::with_capacity(total);
        for part in parts {
            out.extend_from_slice(part.samples());
        }
        Ok(Self::from_interleaved(out, format))
    }

    /// Root-mean-square level over all samples, 0.0 for an empty buffer.
    pub fn rms(&self) -> f32 {
        let samples = self.samples();
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }

    /// RMS level in dB relative to full scale. Silence is `-inf`.
    pub fn dbfs(&self) -> f32 {
        amplitude_to_db(self.rms())
    }

    pub(crate) fn check_format(
        &self,
        other: &AudioBuffer,
        context: &'static str,
    ) -> Result<(), SpliceError> {
        if self.format != other.format {
            return Err(SpliceError::FormatMismatch {
                context,
                expected: self.format,
                found: other.format,
            });
        }
        Ok(())
    }
}

impl PartialEq for AudioBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format && self.samples() == other.samples()
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("format", &self.format)
            .field("frames", &self.frames)
            .field("duration_ms", &self.duration_ms())
            .finish()
    }
}

/// dBFS for a linear amplitude where 1.0 is full scale.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * amplitude.log10()
}

/// Linear amplitude for a dBFS value.
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

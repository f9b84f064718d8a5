use crate::audio_buffer::{AudioBuffer, db_to_amplitude};
use crate::error::SpliceError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A half-open millisecond interval judged silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceSpan {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SilenceSpan {
    pub fn len_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// How much silence was found at each end of a recording, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSilence {
    pub leading: usize,
    pub trailing: usize,
}

/// RMS level of `buf` in dBFS, `-inf` for digital silence.
pub fn rms_db(buf: &AudioBuffer) -> f32 {
    buf.dbfs()
}

/// Frames of silence at the start of `buf`.
///
/// Walks forward in `chunk_ms` chunks while the chunk's RMS level is at or
/// below `threshold_db`, the same test the interior scan applies. The span
/// ends at the first chunk that is not silent, so the result is a multiple of
/// the chunk length unless the whole buffer is silent.
pub fn leading_silence_frames(buf: &AudioBuffer, threshold_db: f32, chunk_ms: u64) -> usize {
    let chunk = buf.format().ms_to_frames(chunk_ms).max(1);
    let frames = buf.frame_count();
    let mut pos = 0;
    while pos < frames {
        let end = pos.saturating_add(chunk).min(frames);
        if rms_db(&buf.slice_frames(pos..end)) > threshold_db {
            break;
        }
        pos = end;
    }
    pos.min(frames)
}

/// Frames of silence at the end of `buf`, measured from the end inward.
pub fn trailing_silence_frames(buf: &AudioBuffer, threshold_db: f32, chunk_ms: u64) -> usize {
    let chunk = buf.format().ms_to_frames(chunk_ms).max(1);
    let frames = buf.frame_count();
    let mut end = frames;
    while end > 0 {
        let start = end.saturating_sub(chunk);
        if rms_db(&buf.slice_frames(start..end)) > threshold_db {
            break;
        }
        end = start;
    }
    frames - end
}

/// Milliseconds of silence at the start of `buf`.
pub fn detect_leading_silence(buf: &AudioBuffer, threshold_db: f32, chunk_ms: u64) -> u64 {
    buf.format()
        .frames_to_ms(leading_silence_frames(buf, threshold_db, chunk_ms))
}

/// Milliseconds of silence at the end of `buf`.
pub fn detect_trailing_silence(buf: &AudioBuffer, threshold_db: f32, chunk_ms: u64) -> u64 {
    buf.format()
        .frames_to_ms(trailing_silence_frames(buf, threshold_db, chunk_ms))
}

/// Strip the silent lead-in and tail. Returns the trimmed view and what was cut.
///
/// A buffer that is silent from end to end trims down to nothing.
pub fn trim_leading_trailing(
    buf: &AudioBuffer,
    threshold_db: f32,
    chunk_ms: u64,
) -> (AudioBuffer, EdgeSilence) {
    let frames = buf.frame_count();
    let leading = leading_silence_frames(buf, threshold_db, chunk_ms);
    if leading >= frames {
        let cut = EdgeSilence {
            leading: frames,
            trailing: 0,
        };
        return (buf.slice_frames(frames..frames), cut);
    }
    let trailing = trailing_silence_frames(buf, threshold_db, chunk_ms);
    let trimmed = buf.slice_frames(leading..frames - trailing);
    (trimmed, EdgeSilence { leading, trailing })
}

/// Window-energy scanner over one buffer.
///
/// Running sums of squared samples are only kept at the frame positions a
/// scan actually asks about, so memory stays proportional to the number of
/// windows rather than the number of frames.
struct EnergyMarks {
    marks: Vec<usize>,
    prefix: Vec<f64>,
    stride: usize,
}

impl EnergyMarks {
    fn new(buf: &AudioBuffer, mut marks: Vec<usize>) -> Self {
        marks.sort_unstable();
        marks.dedup();
        let stride = buf.channels().max(1) as usize;
        let mut prefix = Vec::with_capacity(marks.len());
        let mut acc = 0.0f64;
        let mut frame = 0;
        let mut frames = buf.samples().chunks_exact(stride);
        for &mark in &marks {
            while frame < mark {
                if let Some(samples) = frames.next() {
                    acc += samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
                }
                frame += 1;
            }
            prefix.push(acc);
        }
        EnergyMarks {
            marks,
            prefix,
            stride,
        }
    }

    fn at(&self, frame: usize) -> f64 {
        match self.marks.binary_search(&frame) {
            Ok(i) => self.prefix[i],
            Err(_) => 0.0,
        }
    }

    /// RMS amplitude of frames `[start, start + len)`.
    fn rms(&self, start: usize, len: usize) -> f32 {
        if len == 0 {
            return 0.0;
        }
        let energy = (self.at(start + len) - self.at(start)).max(0.0);
        (energy / (len * self.stride) as f64).sqrt() as f32
    }
}

/// Silent frame ranges of at least `min_silence_len_ms`.
///
/// Windows of that length are tested every `seek_step_ms` (plus one final
/// window flush with the end of the buffer); a window is silent when its RMS
/// level is at or below `threshold_db`. Adjacent or overlapping silent
/// windows merge into one maximal range.
pub fn silent_ranges(
    buf: &AudioBuffer,
    min_silence_len_ms: u64,
    threshold_db: f32,
    seek_step_ms: u64,
) -> Vec<Range<usize>> {
    let format = buf.format();
    let frames = buf.frame_count();
    let min_len = format.ms_to_frames(min_silence_len_ms);
    if min_len == 0 || frames < min_len {
        return Vec::new();
    }
    let step = format.ms_to_frames(seek_step_ms).max(1);
    let last_start = frames - min_len;

    let mut starts: Vec<usize> = (0..=last_start).step_by(step).collect();
    if starts.last() != Some(&last_start) {
        starts.push(last_start);
    }

    let marks = starts.iter().flat_map(|&s| [s, s + min_len]).collect();
    let energy = EnergyMarks::new(buf, marks);
    let threshold = db_to_amplitude(threshold_db);

    let silent_starts: Vec<usize> = starts
        .into_iter()
        .filter(|&s| energy.rms(s, min_len) <= threshold)
        .collect();

    let mut ranges = Vec::new();
    let mut iter = silent_starts.into_iter();
    let Some(first) = iter.next() else {
        return ranges;
    };
    let mut range_start = first;
    let mut prev = first;
    for start in iter {
        let continuous = start == prev.saturating_add(step);
        // two windows that overlap are the same stretch of silence even if a
        // blip made the window between them loud
        let has_gap = start > prev + min_len;
        if !continuous && has_gap {
            ranges.push(range_start..prev + min_len);
            range_start = start;
        }
        prev = start;
    }
    ranges.push(range_start..prev + min_len);
    ranges
}

/// Silent spans of at least `min_silence_len_ms`, in milliseconds.
pub fn detect_silence(
    buf: &AudioBuffer,
    min_silence_len_ms: u64,
    threshold_db: f32,
    seek_step_ms: u64,
) -> Vec<SilenceSpan> {
    let format = buf.format();
    silent_ranges(buf, min_silence_len_ms, threshold_db, seek_step_ms)
        .into_iter()
        .map(|r| SilenceSpan {
            start_ms: format.frames_to_ms(r.start),
            end_ms: format.frames_to_ms(r.end),
        })
        .collect()
}

/// Complement of [`silent_ranges`]: the frame ranges that survive removal.
pub fn nonsilent_ranges(
    buf: &AudioBuffer,
    min_silence_len_ms: u64,
    threshold_db: f32,
    seek_step_ms: u64,
) -> Vec<Range<usize>> {
    let silent = silent_ranges(buf, min_silence_len_ms, threshold_db, seek_step_ms);
    let mut keep = Vec::with_capacity(silent.len() + 1);
    let mut cursor = 0;
    for range in silent {
        if range.start > cursor {
            keep.push(cursor..range.start);
        }
        cursor = cursor.max(range.end);
    }
    if cursor < buf.frame_count() {
        keep.push(cursor..buf.frame_count());
    }
    keep
}

/// Non-silent spans in milliseconds.
pub fn detect_nonsilent(
    buf: &AudioBuffer,
    min_silence_len_ms: u64,
    threshold_db: f32,
    seek_step_ms: u64,
) -> Vec<SilenceSpan> {
    let format = buf.format();
    nonsilent_ranges(buf, min_silence_len_ms, threshold_db, seek_step_ms)
        .into_iter()
        .map(|r| SilenceSpan {
            start_ms: format.frames_to_ms(r.start),
            end_ms: format.frames_to_ms(r.end),
        })
        .collect()
}

/// Cut every long silent span and join what is left, in order.
///
/// Returns the joined buffer and the number of frames removed. With no
/// silent spans the output equals the input.
pub fn remove_silence(
    buf: &AudioBuffer,
    min_silence_len_ms: u64,
    threshold_db: f32,
    seek_step_ms: u64,
) -> Result<(AudioBuffer, usize), SpliceError> {
    let keep = nonsilent_ranges(buf, min_silence_len_ms, threshold_db, seek_step_ms);
    let segments: Vec<AudioBuffer> = keep.into_iter().map(|r| buf.slice_frames(r)).collect();
    let joined = AudioBuffer::join(buf.format(), &segments)?;
    let removed = buf.frame_count() - joined.frame_count();
    Ok((joined, removed))
}

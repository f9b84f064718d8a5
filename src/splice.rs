//! The splice engine: trim dead air from a recorded show and join it to the
//! station intro and outro jingles with crossfades.
//!
//! Pure computation over in-memory buffers. Inputs are borrowed and never
//! modified; the same inputs always produce the same output.

use crate::audio_buffer::AudioBuffer;
use crate::error::SpliceError;
use crate::silence;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which silence gets removed before splicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SilencePolicy {
    /// Strip only the silent lead-in and tail.
    #[default]
    LeadingTrailing,
    /// Remove every silent gap of at least `min_silence_len_ms`, anywhere.
    Interior,
}

impl fmt::Display for SilencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SilencePolicy::LeadingTrailing => write!(f, "leading-trailing"),
            SilencePolicy::Interior => write!(f, "interior"),
        }
    }
}

impl SilencePolicy {
    /// Parse a policy name (case-insensitive, hyphens or underscores).
    pub fn from_str_loose(s: &str) -> Result<Self, String> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "leading-trailing" | "edges" => Ok(SilencePolicy::LeadingTrailing),
            "interior" | "all" => Ok(SilencePolicy::Interior),
            _ => Err(format!(
                "Unknown silence policy '{}'. Expected: leading-trailing, interior",
                s
            )),
        }
    }
}

/// Tuning for one splice. Every field has a serde default so partial config
/// files keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpliceConfig {
    /// RMS level in dBFS at or below which audio counts as silent.
    #[serde(default = "default_threshold_db")]
    pub silence_threshold_db: f32,
    #[serde(default)]
    pub silence_policy: SilencePolicy,
    /// Shortest interior gap that gets removed (interior policy only).
    #[serde(default = "default_min_silence_len_ms")]
    pub min_silence_len_ms: u64,
    /// Scan step for interior detection. Coarser is faster and less exact.
    #[serde(default = "default_step_ms")]
    pub seek_step_ms: u64,
    /// Chunk size for leading/trailing detection.
    #[serde(default = "default_step_ms")]
    pub trim_chunk_ms: u64,
    #[serde(default = "default_start_crossfade_ms")]
    pub start_crossfade_ms: u64,
    #[serde(default = "default_end_crossfade_ms")]
    pub end_crossfade_ms: u64,
    /// Recordings shorter than this are not real shows and are skipped.
    #[serde(default = "default_min_input_len_ms")]
    pub min_input_len_ms: u64,
}

fn default_threshold_db() -> f32 {
    -50.0
}
fn default_min_silence_len_ms() -> u64 {
    5_000
}
fn default_step_ms() -> u64 {
    10
}
fn default_start_crossfade_ms() -> u64 {
    5_800
}
fn default_end_crossfade_ms() -> u64 {
    7_200
}
fn default_min_input_len_ms() -> u64 {
    1_800_000
}

impl Default for SpliceConfig {
    fn default() -> Self {
        SpliceConfig {
            silence_threshold_db: default_threshold_db(),
            silence_policy: SilencePolicy::default(),
            min_silence_len_ms: default_min_silence_len_ms(),
            seek_step_ms: default_step_ms(),
            trim_chunk_ms: default_step_ms(),
            start_crossfade_ms: default_start_crossfade_ms(),
            end_crossfade_ms: default_end_crossfade_ms(),
            min_input_len_ms: default_min_input_len_ms(),
        }
    }
}

impl SpliceConfig {
    /// Settings of the first deployment: anything over 13 s counts as a show.
    pub fn earliest_revision() -> Self {
        SpliceConfig {
            min_input_len_ms: 13_000,
            ..SpliceConfig::default()
        }
    }
}

/// A spliced show ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedShow {
    pub audio: AudioBuffer,
    /// Length of the show after silence removal.
    pub trimmed_ms: u64,
    /// How much silence was cut from the show.
    pub removed_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceOutcome {
    Finished(FinishedShow),
    /// The recording is below `min_input_len_ms`; drop it quietly.
    Skipped { length_ms: u64 },
}

/// Remove silence from `show` and join it between the two jingles.
///
/// Output layout, in frames (`xs`/`xe` are the crossfade lengths):
///
/// ```text
/// start_jingle[..-xs] | blend(start_jingle[-xs..], show[..xs]) | show[xs..-xe]
///     | blend(show[-xe..], end_jingle[..xe]) | end_jingle[xe..]
/// ```
///
/// so `len = start_jingle + trimmed_show + end_jingle - xs - xe`.
pub fn splice(
    show: &AudioBuffer,
    start_jingle: &AudioBuffer,
    end_jingle: &AudioBuffer,
    config: &SpliceConfig,
) -> Result<SpliceOutcome, SpliceError> {
    let format = start_jingle.format();
    let xs = format.ms_to_frames(config.start_crossfade_ms);
    let xe = end_jingle.format().ms_to_frames(config.end_crossfade_ms);

    if xs > start_jingle.frame_count() {
        return Err(SpliceError::Configuration {
            which: "start",
            crossfade_ms: config.start_crossfade_ms,
            jingle_ms: start_jingle.duration_ms(),
        });
    }
    if xe > end_jingle.frame_count() {
        return Err(SpliceError::Configuration {
            which: "end",
            crossfade_ms: config.end_crossfade_ms,
            jingle_ms: end_jingle.duration_ms(),
        });
    }
    start_jingle.check_format(end_jingle, "end jingle")?;

    if show.duration_ms() < config.min_input_len_ms {
        log::debug!(
            "show is {} ms, under the {} ms minimum",
            show.duration_ms(),
            config.min_input_len_ms
        );
        return Ok(SpliceOutcome::Skipped {
            length_ms: show.duration_ms(),
        });
    }
    start_jingle.check_format(show, "show")?;

    let trimmed = remove_silence(show, config)?;
    let len = trimmed.frame_count();
    if len < xs.saturating_add(xe) {
        return Err(SpliceError::TrimTooAggressive {
            trimmed_ms: trimmed.duration_ms(),
            required_ms: config
                .start_crossfade_ms
                .saturating_add(config.end_crossfade_ms),
        });
    }

    let blended_start = start_jingle
        .tail(xs)
        .fade_out(config.start_crossfade_ms)
        .overlay(&trimmed.head(xs).fade_in(config.start_crossfade_ms))?;

    let blended_end = trimmed
        .tail(xe)
        .fade_out(config.end_crossfade_ms)
        .overlay(&end_jingle.head(xe).fade_in(config.end_crossfade_ms))?;

    let audio = AudioBuffer::join(
        format,
        [
            &start_jingle.slice_frames(0..start_jingle.frame_count() - xs),
            &blended_start,
            &trimmed.slice_frames(xs..len - xe),
            &blended_end,
            &end_jingle.slice_frames(xe..end_jingle.frame_count()),
        ],
    )?;

    Ok(SpliceOutcome::Finished(FinishedShow {
        audio,
        trimmed_ms: trimmed.duration_ms(),
        removed_ms: format.frames_to_ms(show.frame_count() - len),
    }))
}

/// Step 1 of a splice, on its own: the show with silence removed per `config`.
pub fn remove_silence(show: &AudioBuffer, config: &SpliceConfig) -> Result<AudioBuffer, SpliceError> {
    match config.silence_policy {
        SilencePolicy::LeadingTrailing => {
            let (trimmed, cut) = silence::trim_leading_trailing(
                show,
                config.silence_threshold_db,
                config.trim_chunk_ms,
            );
            log::debug!(
                "trimmed {} ms lead-in and {} ms tail",
                show.format().frames_to_ms(cut.leading),
                show.format().frames_to_ms(cut.trailing)
            );
            Ok(trimmed)
        }
        SilencePolicy::Interior => {
            let (trimmed, removed) = silence::remove_silence(
                show,
                config.min_silence_len_ms,
                config.silence_threshold_db,
                config.seek_step_ms,
            )?;
            log::debug!(
                "removed {} ms of interior silence",
                show.format().frames_to_ms(removed)
            );
            Ok(trimmed)
        }
    }
}

//! Error types for the splice engine and the pipeline around it.

use crate::audio_buffer::AudioFormat;
use thiserror::Error;

/// Failures of the splice engine. A show that is too short is not an error,
/// see [`crate::splice::SpliceOutcome::Skipped`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpliceError {
    /// A crossfade is longer than the jingle it overlaps. Fatal for the whole run.
    #[error("{which} crossfade of {crossfade_ms} ms exceeds the {jingle_ms} ms jingle")]
    Configuration {
        which: &'static str,
        crossfade_ms: u64,
        jingle_ms: u64,
    },

    /// Silence removal left no room for both crossfade windows.
    #[error(
        "trimmed show is {trimmed_ms} ms, shorter than the {required_ms} ms both crossfades need"
    )]
    TrimTooAggressive { trimmed_ms: u64, required_ms: u64 },

    /// Sample rate or channel count differ between buffers that must be joined.
    #[error("{context}: expected {expected}, found {found}")]
    FormatMismatch {
        context: &'static str,
        expected: AudioFormat,
        found: AudioFormat,
    },
}

/// Decoding and encoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot decode audio: {0}")]
    Decode(String),

    #[error("decoded audio has no samples")]
    Empty,

    #[error("cannot encode audio: {0}")]
    Encode(String),

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("cannot write tags: {0}")]
    Tag(#[from] lofty::error::LoftyError),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to one of the remote collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("unexpected response from {service}: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems loading configuration or credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("config field '{0}' is empty")]
    MissingField(&'static str),
}

/// Per-show failure. The pipeline reports it and moves on to the next show.
#[derive(Debug, Error)]
pub enum ShowError {
    #[error("filename does not start with YYYYMMDD_HHMM: {0}")]
    BadFilename(String),

    #[error(transparent)]
    Splice(#[from] SpliceError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Failure that stops the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot load {which} jingle: {source}")]
    Jingle {
        which: &'static str,
        source: Box<ShowError>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Splice(#[from] SpliceError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

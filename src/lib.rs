//! show_splicer: post-production for recorded radio shows.
//!
//! The splice engine (silence trimming plus jingle crossfades) is pure and
//! lives in [`splice`], [`silence`] and [`audio_buffer`]. The remaining
//! modules fetch recordings, encode and publish the result, and report
//! failures. The CLI in `main.rs` wires them together.

pub mod audio_buffer;
pub mod codec;
pub mod config;
pub mod contentful;
pub mod drive;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod silence;
pub mod slack;
pub mod soundcloud;
pub mod splice;
pub mod stamp;
pub mod token;

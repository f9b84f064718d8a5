//! Decoding recordings into [`AudioBuffer`]s and encoding finished shows.
//!
//! Decoding goes through rodio. Encoding writes a 16-bit WAV with hound and,
//! for mp3, hands it to ffmpeg; tags are written afterwards with lofty.

use crate::audio_buffer::{AudioBuffer, AudioFormat};
use crate::error::CodecError;
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};
use rodio::source::UniformSourceIterator;
use rodio::{Decoder, Source};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Container formats accepted as show recordings.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "flac"];

/// Lowercased extension of a file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// True when the file name has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn open(bytes: Vec<u8>, hint: Option<&str>) -> Result<Decoder<Cursor<Vec<u8>>>, CodecError> {
    let cursor = Cursor::new(bytes);
    let decoder = match hint.map(|h| h.to_ascii_lowercase()).as_deref() {
        Some("wav") => Decoder::new_wav(cursor),
        Some("mp3") => Decoder::new_mp3(cursor),
        Some("ogg") => Decoder::new_vorbis(cursor),
        Some("flac") => Decoder::new_flac(cursor),
        _ => Decoder::new(cursor),
    };
    decoder.map_err(|e| CodecError::Decode(e.to_string()))
}

/// Decode a whole recording in its native format.
///
/// `hint` is the file extension; without one the container is probed.
pub fn decode(bytes: Vec<u8>, hint: Option<&str>) -> Result<AudioBuffer, CodecError> {
    let source = open(bytes, hint)?;
    let format = AudioFormat::new(source.sample_rate(), source.channels());
    let samples: Vec<f32> = source.convert_samples::<f32>().collect();
    if samples.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(AudioBuffer::from_interleaved(samples, format))
}

/// Decode a recording and convert it to `target` (channel count and sample rate).
pub fn decode_conformed(
    bytes: Vec<u8>,
    hint: Option<&str>,
    target: AudioFormat,
) -> Result<AudioBuffer, CodecError> {
    let source = open(bytes, hint)?;
    let native = AudioFormat::new(source.sample_rate(), source.channels());
    if native != target {
        log::warn!("Resampling {} to {}", native, target);
    }
    let uniform: UniformSourceIterator<_, f32> =
        UniformSourceIterator::new(source, target.channels, target.sample_rate);
    let samples: Vec<f32> = uniform.collect();
    if samples.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(AudioBuffer::from_interleaved(samples, target))
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

fn wav_spec(format: AudioFormat) -> hound::WavSpec {
    hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// 16-bit PCM WAV bytes for `audio`.
pub fn wav_bytes(audio: &AudioBuffer) -> Result<Vec<u8>, CodecError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(audio.format()))?;
        for &s in audio.samples() {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write `audio` as a 16-bit PCM WAV file.
pub fn write_wav(audio: &AudioBuffer, path: &Path) -> Result<(), CodecError> {
    let mut writer = hound::WavWriter::create(path, wav_spec(audio.format()))?;
    for &s in audio.samples() {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Tags embedded into an encoded show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: Option<String>,
    pub title: Option<String>,
    /// Recording date, `YYYY-MM-DDTHH:MM`.
    pub date: Option<String>,
}

/// Write `tags` into the audio file at `path`, creating its primary tag if needed.
pub fn write_tags(path: &Path, tags: &TrackTags) -> Result<(), CodecError> {
    let mut tagged = lofty::read_from_path(path)?;
    if tagged.primary_tag().is_none() {
        let tag_type = tagged.primary_tag_type();
        tagged.insert_tag(Tag::new(tag_type));
    }
    let Some(tag) = tagged.primary_tag_mut() else {
        return Err(CodecError::Encode(format!(
            "'{}' does not accept tags",
            path.display()
        )));
    };
    if let Some(artist) = &tags.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(title) = &tags.title {
        tag.set_title(title.clone());
    }
    if let Some(date) = &tags.date {
        tag.insert_text(ItemKey::RecordingDate, date.clone());
    }
    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

/// Turns a finished show into upload-ready bytes.
pub trait ShowEncoder: Send + Sync {
    /// File extension of the produced bytes, without the dot.
    fn extension(&self) -> &'static str;
    fn mime_type(&self) -> &'static str;
    fn encode(&self, audio: &AudioBuffer, tags: &TrackTags) -> Result<Vec<u8>, CodecError>;
}

/// Build the ffmpeg argument list for a WAV → constant-bitrate mp3 conversion.
pub fn build_mp3_args(input_path: &str, output_path: &str, bitrate_kbps: u32) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input_path.to_string(),
        "-codec:a".into(),
        "libmp3lame".into(),
        "-b:a".into(),
        format!("{}k", bitrate_kbps),
        output_path.to_string(),
    ]
}

/// Run ffmpeg with the given argument list, surfacing its stderr on failure.
pub fn run_ffmpeg(ffmpeg: &Path, args: &[String]) -> Result<(), CodecError> {
    let output = Command::new(ffmpeg)
        .args(args)
        .output()
        .map_err(|e| CodecError::Ffmpeg(format!("failed to launch '{}': {}", ffmpeg.display(), e)))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(CodecError::Ffmpeg(format!(
            "exited with status {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// mp3 output through an external ffmpeg with libmp3lame.
#[derive(Debug, Clone)]
pub struct Mp3Encoder {
    pub bitrate_kbps: u32,
    pub ffmpeg: PathBuf,
}

impl Mp3Encoder {
    pub fn new(bitrate_kbps: u32, ffmpeg: impl Into<PathBuf>) -> Self {
        Mp3Encoder {
            bitrate_kbps,
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl ShowEncoder for Mp3Encoder {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn mime_type(&self) -> &'static str {
        "audio/mpeg"
    }

    fn encode(&self, audio: &AudioBuffer, tags: &TrackTags) -> Result<Vec<u8>, CodecError> {
        let dir = tempfile::tempdir()?;
        let wav = dir.path().join("show.wav");
        let mp3 = dir.path().join("show.mp3");
        write_wav(audio, &wav)?;
        let args = build_mp3_args(
            &wav.to_string_lossy(),
            &mp3.to_string_lossy(),
            self.bitrate_kbps,
        );
        run_ffmpeg(&self.ffmpeg, &args)?;
        write_tags(&mp3, tags)?;
        Ok(std::fs::read(&mp3)?)
    }
}

/// Uncompressed 16-bit WAV output, tagged when tags are given.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

impl ShowEncoder for WavEncoder {
    fn extension(&self) -> &'static str {
        "wav"
    }

    fn mime_type(&self) -> &'static str {
        "audio/wav"
    }

    fn encode(&self, audio: &AudioBuffer, tags: &TrackTags) -> Result<Vec<u8>, CodecError> {
        if *tags == TrackTags::default() {
            return wav_bytes(audio);
        }
        let dir = tempfile::tempdir()?;
        let wav = dir.path().join("show.wav");
        write_wav(audio, &wav)?;
        write_tags(&wav, tags)?;
        Ok(std::fs::read(&wav)?)
    }
}

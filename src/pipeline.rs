//! One post-production run over the inbox folder.
//!
//! Shows are handled one at a time: download, decode, splice, encode,
//! publish, write the link back to the show entry, file the recording away.
//! A failing show is reported and left in the inbox for the next run; only
//! misconfiguration stops the run.

use crate::audio_buffer::AudioBuffer;
use crate::codec::{self, ShowEncoder, TrackTags};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ServiceError, ShowError, SpliceError};
use crate::services::{Services, ShowRecord, Upload};
use crate::splice::{self, SpliceOutcome};
use crate::stamp::ShowStamp;
use std::path::Path;
use std::time::Instant;

/// The intro and outro every show is spliced between, in one shared format.
#[derive(Debug, Clone)]
pub struct Jingles {
    pub start: AudioBuffer,
    pub end: AudioBuffer,
}

impl Jingles {
    /// Fetch both jingles. The end jingle is converted to the start jingle's
    /// format so the splice never sees mismatched clips.
    pub fn load(services: &Services, config: &PipelineConfig) -> Result<Self, PipelineError> {
        let fetch = |which: &'static str, id: &str| {
            services
                .store
                .fetch(id)
                .map_err(|e| PipelineError::Jingle {
                    which,
                    source: Box::new(e.into()),
                })
        };
        let codec_err = |which: &'static str| {
            move |e: crate::error::CodecError| PipelineError::Jingle {
                which,
                source: Box::new(e.into()),
            }
        };

        let start = codec::decode(fetch("start", &config.start_jingle_id)?, None)
            .map_err(codec_err("start"))?;
        let end = codec::decode_conformed(
            fetch("end", &config.end_jingle_id)?,
            None,
            start.format(),
        )
        .map_err(codec_err("end"))?;
        log::info!(
            "Jingles loaded: start {} ms, end {} ms at {}",
            start.duration_ms(),
            end.duration_ms(),
            start.format()
        );
        Ok(Jingles { start, end })
    }
}

/// What became of each file in the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Result of one show that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowResult {
    Published { url: String },
    /// Too short to be a real show; left where it is.
    Skipped { length_ms: u64 },
}

pub struct PostProduction<'a> {
    services: &'a Services,
    config: &'a PipelineConfig,
    jingles: Jingles,
    encoder: &'a dyn ShowEncoder,
}

impl<'a> PostProduction<'a> {
    /// Load the jingles and get ready to run.
    pub fn new(
        services: &'a Services,
        config: &'a PipelineConfig,
        encoder: &'a dyn ShowEncoder,
    ) -> Result<Self, PipelineError> {
        let jingles = Jingles::load(services, config)?;
        Ok(Self::with_jingles(services, config, jingles, encoder))
    }

    pub fn with_jingles(
        services: &'a Services,
        config: &'a PipelineConfig,
        jingles: Jingles,
        encoder: &'a dyn ShowEncoder,
    ) -> Self {
        PostProduction {
            services,
            config,
            jingles,
            encoder,
        }
    }

    /// Process every supported recording in the inbox folder.
    pub fn run_inbox(&self) -> Result<RunReport, PipelineError> {
        let files = self.services.store.list_files(&self.config.inbox_folder_id)?;
        log::info!("{} file(s) in inbox", files.len());
        let mut report = RunReport::default();

        for (name, file_id) in files {
            if !codec::is_supported(&name) {
                log::debug!("Ignoring {}", name);
                continue;
            }
            let started = Instant::now();
            match self.process_show(&name, &file_id) {
                Ok(ShowResult::Published { url }) => {
                    log::info!(
                        "Processed {} in {:.2}s: {}",
                        name,
                        started.elapsed().as_secs_f64(),
                        url
                    );
                    report.processed.push(name);
                }
                Ok(ShowResult::Skipped { length_ms }) => {
                    log::info!("Skipped {}: only {} ms long", name, length_ms);
                    report.skipped.push(name);
                }
                Err(ShowError::Splice(e @ SpliceError::Configuration { .. })) => {
                    return Err(e.into());
                }
                Err(e) => {
                    let message = format!("Error processing audio {}: {}", name, e);
                    log::error!("{}", message);
                    self.services.alerter.notify_failure(&message);
                    report.failed.push(name);
                }
            }
        }

        log::info!(
            "Run finished: {} processed, {} skipped, {} failed",
            report.processed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Take one recording from download to archive.
    pub fn process_show(&self, name: &str, file_id: &str) -> Result<ShowResult, ShowError> {
        let stamp = ShowStamp::from_filename(name)?;
        let bytes = self.services.store.fetch(file_id)?;
        let ext = codec::extension_of(name);
        let show = if self.config.conform_format {
            codec::decode_conformed(bytes, ext.as_deref(), self.jingles.start.format())?
        } else {
            codec::decode(bytes, ext.as_deref())?
        };

        log::info!("Splicing {} ({} ms)", name, show.duration_ms());
        let finished = match splice::splice(
            &show,
            &self.jingles.start,
            &self.jingles.end,
            &self.config.splice,
        )? {
            SpliceOutcome::Finished(finished) => finished,
            SpliceOutcome::Skipped { length_ms } => {
                return Ok(ShowResult::Skipped { length_ms });
            }
        };
        drop(show);
        log::info!(
            "Removed {} ms of silence, output {} ms",
            finished.removed_ms,
            finished.audio.duration_ms()
        );

        let tags = TrackTags {
            artist: Some(self.config.artist_tag.clone()),
            title: None,
            date: Some(stamp.tag_date()),
        };
        let encoded = self.encoder.encode(&finished.audio, &tags)?;
        drop(finished);
        if let Some(output_folder_id) = &self.config.output_folder_id {
            self.store_finished(name, &stamp, output_folder_id, &encoded)?;
        }

        let record = self
            .services
            .metadata
            .lookup_show(stamp.slot(self.config.slot_offset_minutes))?;
        let upload = self.upload_for(name, &stamp, record.as_ref(), encoded);
        let url = self.services.publisher.publish(&upload)?;

        // Published from here on; a failure below must not fail the show or
        // the next run would publish it again.
        if let Some(record) = &record {
            if let Err(e) = self.services.metadata.update_show_link(&record.entry_id, &url) {
                self.services.alerter.notify_failure(&format!(
                    "Published {} to {} but could not update show entry {}: {}",
                    name, url, record.entry_id, e
                ));
            }
        }
        if let Err(e) = self.archive(&stamp, file_id) {
            self.services.alerter.notify_failure(&format!(
                "Published {} to {} but could not archive the recording: {}",
                name, url, e
            ));
        }
        Ok(ShowResult::Published { url })
    }

    fn upload_for(
        &self,
        name: &str,
        stamp: &ShowStamp,
        record: Option<&ShowRecord>,
        bytes: Vec<u8>,
    ) -> Upload {
        let (title, description, tags) = match record {
            Some(r) if !r.title.is_empty() => (r.title.clone(), r.description.clone(), r.genres.clone()),
            _ => (
                format!("{} {}", self.config.artist_tag, stamp.label()),
                String::new(),
                Vec::new(),
            ),
        };
        let artwork = record
            .and_then(|r| r.artwork_url.as_deref())
            .and_then(|url| match self.services.metadata.fetch_artwork(url) {
                Ok(image) => Some(image),
                Err(e) => {
                    log::warn!("Uploading without artwork, fetch failed: {}", e);
                    None
                }
            });
        Upload {
            bytes,
            file_name: format!("{}.{}", file_stem(name), self.encoder.extension()),
            mime_type: self.encoder.mime_type().to_string(),
            title,
            description,
            tags,
            artwork,
            visibility: self.config.visibility,
            downloadable: self.config.downloadable,
        }
    }

    /// Keep a copy of the encoded show in the output folder for its day.
    fn store_finished(
        &self,
        name: &str,
        stamp: &ShowStamp,
        output_folder_id: &str,
        encoded: &[u8],
    ) -> Result<String, ServiceError> {
        let store = &self.services.store;
        let day = store.create_folder(&stamp.day_folder(), output_folder_id)?;
        let file_name = format!(
            "final_show_with_jingle_{}.{}",
            file_stem(name),
            self.encoder.extension()
        );
        let id = store.upload(&file_name, &day, encoded, self.encoder.mime_type())?;
        log::info!("Stored {} in {} ({})", file_name, stamp.day_folder(), id);
        Ok(id)
    }

    /// Move the recording into the archive folder for its day.
    fn archive(&self, stamp: &ShowStamp, file_id: &str) -> Result<(), ServiceError> {
        let store = &self.services.store;
        let folder = store.create_folder(&stamp.day_folder(), &self.config.archive_folder_id)?;
        store.move_file(file_id, &folder)
    }
}

/// Recording name without its extension.
fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

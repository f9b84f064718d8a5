//! Whole post-production runs against in-memory collaborators.

use chrono::{NaiveDate, NaiveDateTime};
use show_splicer::audio_buffer::{AudioBuffer, AudioFormat};
use show_splicer::codec::{self, WavEncoder};
use show_splicer::config::PipelineConfig;
use show_splicer::error::{PipelineError, ServiceError, SpliceError};
use show_splicer::pipeline::{Jingles, PostProduction};
use show_splicer::services::{
    Alerter, FileStore, MetadataStore, Publisher, Services, ShowRecord, Upload, Visibility,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

const INBOX: &str = "inbox";
const ARCHIVE: &str = "archive";
const JINGLES: &str = "jingles";
const OUTPUT: &str = "output";

fn format() -> AudioFormat {
    AudioFormat::new(8_000, 1)
}

fn level(ms: u64, value: f32) -> AudioBuffer {
    AudioBuffer::from_interleaved(vec![value; format().ms_to_frames(ms)], format())
}

/// 2 s of dead air, `program_ms` of program, 2 s of dead air.
fn show_wav(program_ms: u64) -> Vec<u8> {
    show_wav_in(format(), program_ms)
}

fn show_wav_in(format: AudioFormat, program_ms: u64) -> Vec<u8> {
    let program = AudioBuffer::from_interleaved(
        vec![0.3; format.ms_to_frames(program_ms) * format.channels as usize],
        format,
    );
    let audio = AudioBuffer::join(
        format,
        [
            &AudioBuffer::silent(format, 2_000),
            &program,
            &AudioBuffer::silent(format, 2_000),
        ],
    )
    .unwrap();
    codec::wav_bytes(&audio).unwrap()
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

struct StoredFile {
    name: String,
    parent: String,
    bytes: Vec<u8>,
    mime_type: String,
}

#[derive(Default)]
struct World {
    files: Mutex<BTreeMap<String, StoredFile>>,
    folders: Mutex<Vec<(String, String, String)>>,
    uploads: Mutex<Vec<Upload>>,
    records: HashMap<NaiveDateTime, ShowRecord>,
    links: Mutex<Vec<(String, String)>>,
    alerts: Mutex<Vec<String>>,
    fail_link_update: bool,
}

impl World {
    fn add_file(&self, id: &str, name: &str, parent: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(
            id.to_string(),
            StoredFile {
                name: name.to_string(),
                parent: parent.to_string(),
                bytes,
                mime_type: String::new(),
            },
        );
    }

    fn names_in(&self, folder: &str) -> Vec<String> {
        let files = self.files.lock().unwrap();
        let mut names: Vec<String> = files
            .values()
            .filter(|f| f.parent == folder)
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    fn folder_id(&self, name: &str, parent: &str) -> Option<String> {
        self.folders
            .lock()
            .unwrap()
            .iter()
            .find(|(_, n, p)| n == name && p == parent)
            .map(|(id, _, _)| id.clone())
    }
}

fn not_found(id: &str) -> ServiceError {
    ServiceError::Status {
        service: "memory",
        status: 404,
        body: format!("no file {}", id),
    }
}

#[derive(Clone)]
struct Fake(Arc<World>);

impl FileStore for Fake {
    fn list_files(&self, folder_id: &str) -> Result<BTreeMap<String, String>, ServiceError> {
        let files = self.0.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|(_, f)| f.parent == folder_id)
            .map(|(id, f)| (f.name.clone(), id.clone()))
            .collect())
    }

    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ServiceError> {
        let files = self.0.files.lock().unwrap();
        files
            .get(file_id)
            .map(|f| f.bytes.clone())
            .ok_or_else(|| not_found(file_id))
    }

    fn move_file(&self, file_id: &str, dest_folder_id: &str) -> Result<(), ServiceError> {
        let mut files = self.0.files.lock().unwrap();
        let file = files.get_mut(file_id).ok_or_else(|| not_found(file_id))?;
        file.parent = dest_folder_id.to_string();
        Ok(())
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, ServiceError> {
        if let Some(id) = self.0.folder_id(name, parent_id) {
            return Ok(id);
        }
        let mut folders = self.0.folders.lock().unwrap();
        let id = format!("folder-{}", folders.len() + 1);
        folders.push((id.clone(), name.to_string(), parent_id.to_string()));
        Ok(id)
    }

    fn upload(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ServiceError> {
        let mut files = self.0.files.lock().unwrap();
        let id = format!("stored-{}", files.len() + 1);
        files.insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                parent: parent_id.to_string(),
                bytes: bytes.to_vec(),
                mime_type: mime_type.to_string(),
            },
        );
        Ok(id)
    }
}

impl Publisher for Fake {
    fn publish(&self, upload: &Upload) -> Result<String, ServiceError> {
        let mut uploads = self.0.uploads.lock().unwrap();
        uploads.push(upload.clone());
        Ok(format!("https://soundcloud.test/track-{}", uploads.len()))
    }
}

impl MetadataStore for Fake {
    fn lookup_show(&self, slot: NaiveDateTime) -> Result<Option<ShowRecord>, ServiceError> {
        Ok(self.0.records.get(&slot).cloned())
    }

    fn update_show_link(&self, entry_id: &str, url: &str) -> Result<(), ServiceError> {
        if self.0.fail_link_update {
            return Err(ServiceError::Auth("management token revoked".into()));
        }
        self.0
            .links
            .lock()
            .unwrap()
            .push((entry_id.to_string(), url.to_string()));
        Ok(())
    }

    fn fetch_artwork(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        match url {
            "https://images.test/jazz.jpg" => Ok(vec![0xff, 0xd8, 0xff]),
            _ => Err(not_found(url)),
        }
    }
}

impl Alerter for Fake {
    fn notify_failure(&self, message: &str) {
        self.0.alerts.lock().unwrap().push(message.to_string());
    }
}

fn services(world: &Arc<World>) -> Services {
    let fake = Fake(world.clone());
    Services {
        store: Box::new(fake.clone()),
        publisher: Box::new(fake.clone()),
        metadata: Box::new(fake.clone()),
        alerter: Box::new(fake),
    }
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig {
        inbox_folder_id: INBOX.into(),
        archive_folder_id: ARCHIVE.into(),
        start_jingle_id: "jingle-start".into(),
        end_jingle_id: "jingle-end".into(),
        ..PipelineConfig::default()
    };
    config.splice.min_input_len_ms = 20_000;
    config
}

fn world_with_jingles(records: HashMap<NaiveDateTime, ShowRecord>, fail_link_update: bool) -> Arc<World> {
    let world = World {
        records,
        fail_link_update,
        ..World::default()
    };
    world.add_file(
        "jingle-start",
        "intro.wav",
        JINGLES,
        codec::wav_bytes(&level(8_000, 0.4)).unwrap(),
    );
    world.add_file(
        "jingle-end",
        "outro.wav",
        JINGLES,
        codec::wav_bytes(&level(9_000, 0.2)).unwrap(),
    );
    Arc::new(world)
}

fn jazz_record() -> ShowRecord {
    ShowRecord {
        entry_id: "entry-1400".into(),
        title: "Morning Jazz".into(),
        description: "Two hours of bebop".into(),
        artwork_url: Some("https://images.test/jazz.jpg".into()),
        genres: vec!["jazz".into(), "bebop".into()],
    }
}

#[test]
fn full_run_publishes_skips_and_reports() {
    let mut records = HashMap::new();
    records.insert(at(2024, 1, 15, 14, 0), jazz_record());
    let world = world_with_jingles(records, false);
    world.add_file("f1", "20240115_1350_morning.wav", INBOX, show_wav(26_000));
    world.add_file("f2", "20240116_0900.wav", INBOX, show_wav(26_000));
    world.add_file("f3", "20240117_1000.wav", INBOX, show_wav(6_000));
    world.add_file("f4", "20240118_1200.wav", INBOX, b"RIFF not really".to_vec());
    world.add_file("f5", "broken.wav", INBOX, show_wav(26_000));
    world.add_file("f6", "notes.txt", INBOX, b"running order".to_vec());

    let services = services(&world);
    let config = config();
    let production = PostProduction::new(&services, &config, &WavEncoder).unwrap();
    let report = production.run_inbox().unwrap();

    assert_eq!(
        report.processed,
        vec!["20240115_1350_morning.wav", "20240116_0900.wav"]
    );
    assert_eq!(report.skipped, vec!["20240117_1000.wav"]);
    assert_eq!(report.failed, vec!["20240118_1200.wav", "broken.wav"]);

    let alerts = world.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].starts_with("Error processing audio 20240118_1200.wav: "));
    assert!(alerts[1].starts_with("Error processing audio broken.wav: "));

    let uploads = world.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 2);

    let jazz = &uploads[0];
    assert_eq!(jazz.title, "Morning Jazz");
    assert_eq!(jazz.description, "Two hours of bebop");
    assert_eq!(jazz.tags, vec!["jazz", "bebop"]);
    assert_eq!(jazz.artwork.as_deref(), Some(&[0xff, 0xd8, 0xff][..]));
    assert_eq!(jazz.file_name, "20240115_1350_morning.wav");
    assert_eq!(jazz.mime_type, "audio/wav");
    assert_eq!(jazz.visibility, Visibility::Private);
    assert!(jazz.downloadable);

    // 8 s intro + 26 s program + 9 s outro, minus both crossfades
    let published = codec::decode(jazz.bytes.clone(), Some("wav")).unwrap();
    assert_eq!(published.format(), format());
    assert!(published.duration_ms().abs_diff(30_000) <= 20);

    let untitled = &uploads[1];
    assert_eq!(untitled.title, "Radio Show 16 Jan 09:00");
    assert!(untitled.description.is_empty());
    assert!(untitled.artwork.is_none());

    assert_eq!(
        world.links.lock().unwrap().clone(),
        vec![(
            "entry-1400".to_string(),
            "https://soundcloud.test/track-1".to_string()
        )]
    );

    let jan15 = world.folder_id("15 Jan", ARCHIVE).unwrap();
    let jan16 = world.folder_id("16 Jan", ARCHIVE).unwrap();
    assert_eq!(world.names_in(&jan15), vec!["20240115_1350_morning.wav"]);
    assert_eq!(world.names_in(&jan16), vec!["20240116_0900.wav"]);
    assert_eq!(
        world.names_in(INBOX),
        vec![
            "20240117_1000.wav",
            "20240118_1200.wav",
            "broken.wav",
            "notes.txt"
        ]
    );
}

#[test]
fn archive_folder_is_reused_for_the_same_day() {
    let world = world_with_jingles(HashMap::new(), false);
    world.add_file("a", "20240115_1000.wav", INBOX, show_wav(26_000));
    world.add_file("b", "20240115_1600.wav", INBOX, show_wav(26_000));

    let services = services(&world);
    let config = config();
    let report = PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap();

    assert_eq!(report.processed.len(), 2);
    assert_eq!(world.folders.lock().unwrap().len(), 1);
    let day = world.folder_id("15 Jan", ARCHIVE).unwrap();
    assert_eq!(
        world.names_in(&day),
        vec!["20240115_1000.wav", "20240115_1600.wav"]
    );
}

#[test]
fn finished_show_is_kept_in_the_output_day_folder() {
    let world = world_with_jingles(HashMap::new(), false);
    world.add_file("f1", "20240115_1350_morning.wav", INBOX, show_wav(26_000));

    let services = services(&world);
    let mut config = config();
    config.output_folder_id = Some(OUTPUT.into());
    let report = PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap();
    assert_eq!(report.processed, vec!["20240115_1350_morning.wav"]);

    // a day folder of its own, separate from the archive's
    let output_day = world.folder_id("15 Jan", OUTPUT).unwrap();
    let archive_day = world.folder_id("15 Jan", ARCHIVE).unwrap();
    assert_ne!(output_day, archive_day);
    assert_eq!(
        world.names_in(&output_day),
        vec!["final_show_with_jingle_20240115_1350_morning.wav"]
    );
    assert_eq!(world.names_in(&archive_day), vec!["20240115_1350_morning.wav"]);

    let published = world.uploads.lock().unwrap()[0].bytes.clone();
    let files = world.files.lock().unwrap();
    let kept = files.values().find(|f| f.parent == output_day).unwrap();
    assert_eq!(kept.mime_type, "audio/wav");
    assert_eq!(kept.bytes, published);
}

#[test]
fn nothing_is_kept_without_an_output_folder() {
    let world = world_with_jingles(HashMap::new(), false);
    world.add_file("f1", "20240115_1350.wav", INBOX, show_wav(26_000));

    let services = services(&world);
    let config = config();
    PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap();

    let files = world.files.lock().unwrap();
    assert!(files.values().all(|f| !f.name.starts_with("final_show_with_jingle_")));
}

#[test]
fn other_rate_is_resampled_unless_conforming_is_off() {
    let other = AudioFormat::new(16_000, 1);

    let world = world_with_jingles(HashMap::new(), false);
    world.add_file("f1", "20240115_1000.wav", INBOX, show_wav_in(other, 26_000));
    let services = services(&world);
    let config = config();
    let report = PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap();
    assert_eq!(report.processed, vec!["20240115_1000.wav"]);
    let published = world.uploads.lock().unwrap()[0].bytes.clone();
    assert_eq!(codec::decode(published, Some("wav")).unwrap().format(), format());

    let world = world_with_jingles(HashMap::new(), false);
    world.add_file("f1", "20240115_1000.wav", INBOX, show_wav_in(other, 26_000));
    let services = self::services(&world);
    let mut config = self::config();
    config.conform_format = false;
    let report = PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap();

    assert!(report.processed.is_empty());
    assert_eq!(report.failed, vec!["20240115_1000.wav"]);
    assert!(world.uploads.lock().unwrap().is_empty());
    assert_eq!(world.names_in(INBOX), vec!["20240115_1000.wav"]);
    let alerts = world.alerts.lock().unwrap().clone();
    assert_eq!(
        alerts,
        vec!["Error processing audio 20240115_1000.wav: show: expected 8000 Hz / 1 ch, found 16000 Hz / 1 ch"]
    );
}

#[test]
fn failed_link_update_is_alerted_with_the_permalink() {
    let mut records = HashMap::new();
    records.insert(at(2024, 1, 15, 14, 0), jazz_record());
    let world = world_with_jingles(records, true);
    world.add_file("f1", "20240115_1350.wav", INBOX, show_wav(26_000));

    let services = services(&world);
    let config = config();
    let report = PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap();

    // published, so it counts as processed and leaves the inbox
    assert_eq!(report.processed, vec!["20240115_1350.wav"]);
    assert!(report.failed.is_empty());
    assert!(world.names_in(INBOX).is_empty());

    let alerts = world.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("https://soundcloud.test/track-1"));
    assert!(alerts[0].contains("entry-1400"));
}

#[test]
fn crossfade_longer_than_jingle_stops_the_run() {
    let world = world_with_jingles(HashMap::new(), false);
    world.add_file("f1", "20240115_1000.wav", INBOX, show_wav(26_000));
    world.add_file("f2", "20240116_1000.wav", INBOX, show_wav(26_000));

    let services = services(&world);
    let mut config = config();
    config.splice.start_crossfade_ms = 9_000;
    let err = PostProduction::new(&services, &config, &WavEncoder)
        .unwrap()
        .run_inbox()
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Splice(SpliceError::Configuration { which: "start", .. })
    ));
    assert!(world.uploads.lock().unwrap().is_empty());
    assert_eq!(world.names_in(INBOX).len(), 2);
}

#[test]
fn missing_jingle_is_fatal() {
    let world = world_with_jingles(HashMap::new(), false);
    let services = services(&world);
    let mut config = config();
    config.end_jingle_id = "gone".into();

    match Jingles::load(&services, &config) {
        Err(PipelineError::Jingle { which, .. }) => assert_eq!(which, "end"),
        other => panic!("expected a jingle error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn jingles_share_the_intro_format() {
    let world = world_with_jingles(HashMap::new(), false);
    let services = services(&world);
    let jingles = Jingles::load(&services, &config()).unwrap();
    assert_eq!(jingles.start.format(), format());
    assert_eq!(jingles.end.format(), format());
    assert_eq!(jingles.start.duration_ms(), 8_000);
}

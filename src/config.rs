//! Pipeline settings and credentials.
//!
//! Settings live in a JSON file; secrets are read from the environment once
//! at startup and never written back.

use crate::contentful::{ContentfulCredentials, ContentfulFields};
use crate::error::ConfigError;
use crate::services::Visibility;
use crate::splice::SpliceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "show_splicer";
const CONFIG_FILE: &str = "config.json";
const TOKEN_CACHE_FILE: &str = "soundcloud_token.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub splice: SpliceConfig,
    /// Folder holding raw recordings waiting to be processed.
    pub inbox_folder_id: String,
    /// Folder under which processed recordings are filed by day.
    pub archive_folder_id: String,
    /// When set, every finished show is also stored in a day folder under
    /// this folder as `final_show_with_jingle_<recording>.<ext>`.
    pub output_folder_id: Option<String>,
    pub start_jingle_id: String,
    pub end_jingle_id: String,
    /// Minutes added to the recording start before rounding to the slot.
    pub slot_offset_minutes: i64,
    /// Artist tag on the encoded file, also the prefix of fallback titles.
    pub artist_tag: String,
    pub bitrate_kbps: u32,
    pub visibility: Visibility,
    pub downloadable: bool,
    pub ffmpeg_path: PathBuf,
    /// Resample recordings whose rate or channel count differs from the
    /// start jingle. When off, such recordings fail with a format mismatch.
    pub conform_format: bool,
    /// Where refreshed SoundCloud tokens are kept between runs.
    /// Defaults to the user cache directory.
    pub token_cache: Option<PathBuf>,
    pub contentful: ContentfulFields,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            splice: SpliceConfig::default(),
            inbox_folder_id: String::new(),
            archive_folder_id: String::new(),
            output_folder_id: None,
            start_jingle_id: String::new(),
            end_jingle_id: String::new(),
            slot_offset_minutes: 15,
            artist_tag: "Radio Show".into(),
            bitrate_kbps: 192,
            visibility: Visibility::Private,
            downloadable: true,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            conform_format: true,
            token_cache: None,
            contentful: ContentfulFields::default(),
        }
    }
}

impl PipelineConfig {
    /// `<config dir>/show_splicer/config.json`, or a file in the working
    /// directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Load from `path`, or from [`Self::default_path`] when `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !explicit && !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(PipelineConfig::default());
        }
        let data = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&data)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)?;
        Ok(())
    }

    /// The folder ids a pipeline run cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("inbox_folder_id", &self.inbox_folder_id),
            ("archive_folder_id", &self.archive_folder_id),
            ("start_jingle_id", &self.start_jingle_id),
            ("end_jingle_id", &self.end_jingle_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name));
            }
        }
        if self
            .output_folder_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(ConfigError::MissingField("output_folder_id"));
        }
        Ok(())
    }

    pub fn token_cache_path(&self) -> Option<PathBuf> {
        self.token_cache
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join(APP_DIR).join(TOKEN_CACHE_FILE)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleAuth {
    /// A short-lived token minted elsewhere.
    Static(String),
    Refresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundCloudAuth {
    pub client_id: String,
    pub client_secret: String,
    /// May be empty, in which case the first upload refreshes.
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub google: GoogleAuth,
    pub soundcloud: SoundCloudAuth,
    pub contentful: ContentfulCredentials,
    pub slack_url: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::MissingEnv(key));

        let google = match optional("GOOGLE_DRIVE_ACCESS_TOKEN") {
            Some(token) => GoogleAuth::Static(token),
            None => GoogleAuth::Refresh {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                refresh_token: required("GOOGLE_REFRESH_TOKEN")?,
            },
        };

        let soundcloud = SoundCloudAuth {
            client_id: required("SC_CLIENT_ID")?,
            client_secret: required("SC_CLIENT_SECRET")?,
            access_token: optional("SC_ACCESS_TOKEN").unwrap_or_default(),
            refresh_token: required("SC_REFRESH_TOKEN")?,
        };

        let contentful = ContentfulCredentials {
            space_id: required("CONTENTFUL_SPACE_ID")?,
            environment: optional("CONTENTFUL_ENVIRONMENT").unwrap_or_else(|| "master".into()),
            delivery_token: required("CONTENTFUL_DELIVERY_TOKEN")?,
            management_token: required("CONTENTFUL_MANAGEMENT_TOKEN")?,
        };

        Ok(Credentials {
            google,
            soundcloud,
            contentful,
            slack_url: optional("SLACK_ERROR_URL"),
        })
    }
}

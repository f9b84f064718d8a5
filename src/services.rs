//! Interfaces to the remote services the pipeline talks to.
//!
//! The splice engine never sees these; the pipeline receives one
//! [`Services`] bundle built at startup and calls through the traits, so the
//! whole run can be exercised with in-memory implementations.

use crate::error::ServiceError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cloud folder holding raw recordings, jingles and the archive.
pub trait FileStore: Send + Sync {
    /// File name → file id for every file directly inside `folder_id`.
    fn list_files(&self, folder_id: &str) -> Result<BTreeMap<String, String>, ServiceError>;
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ServiceError>;
    /// Re-parent `file_id` under `dest_folder_id`.
    fn move_file(&self, file_id: &str, dest_folder_id: &str) -> Result<(), ServiceError>;
    /// Id of the folder `name` under `parent_id`, created if it does not exist yet.
    fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, ServiceError>;
    /// Store `bytes` as a new file `name` inside `parent_id` and return its id.
    fn upload(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

/// One track upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub artwork: Option<Vec<u8>>,
    pub visibility: Visibility,
    pub downloadable: bool,
}

/// Streaming platform the finished show is published to.
pub trait Publisher: Send + Sync {
    /// Upload and return the public permalink.
    fn publish(&self, upload: &Upload) -> Result<String, ServiceError>;
}

/// Catalogue entry describing a show slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShowRecord {
    pub entry_id: String,
    pub title: String,
    pub description: String,
    pub artwork_url: Option<String>,
    pub genres: Vec<String>,
}

/// Content-management system holding show descriptions.
pub trait MetadataStore: Send + Sync {
    fn lookup_show(&self, slot: NaiveDateTime) -> Result<Option<ShowRecord>, ServiceError>;
    fn update_show_link(&self, entry_id: &str, url: &str) -> Result<(), ServiceError>;
    fn fetch_artwork(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Chat channel for failure reports. Best effort: implementations log and
/// swallow their own errors.
pub trait Alerter: Send + Sync {
    fn notify_failure(&self, message: &str);
}

/// Alerter that only writes to the log, used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn notify_failure(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// Everything the pipeline needs from the outside world, built once at startup.
pub struct Services {
    pub store: Box<dyn FileStore>,
    pub publisher: Box<dyn Publisher>,
    pub metadata: Box<dyn MetadataStore>,
    pub alerter: Box<dyn Alerter>,
}

/// Pass a successful response through; anything else becomes
/// [`ServiceError::Status`] carrying the response body.
pub(crate) fn check_status(
    service: &'static str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

//! Google Drive v3 as the show [`FileStore`].

use crate::error::ServiceError;
use crate::services::{FileStore, check_status};
use crate::token::TokenStore;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;

pub const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const SERVICE: &str = "Google Drive";
const UPLOAD_BOUNDARY: &str = "show_splicer-7c1e0b5f4d2a9386";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parents: Vec<String>,
}

/// Escape a value for use inside a single-quoted Drive query literal.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn children_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType != '{}' and trashed = false",
        quote(folder_id),
        FOLDER_MIME
    )
}

fn folder_query(name: &str, parent_id: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
        quote(name),
        quote(parent_id),
        FOLDER_MIME
    )
}

/// Body of a `multipart/related` media upload: the JSON metadata part
/// followed by the file itself.
fn related_body(metadata: &serde_json::Value, mime_type: &str, bytes: &[u8]) -> Vec<u8> {
    let head = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
        b = UPLOAD_BOUNDARY,
        meta = metadata,
        mime = mime_type
    );
    let tail = format!("\r\n--{}--\r\n", UPLOAD_BOUNDARY);
    let mut body = Vec::with_capacity(head.len() + bytes.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(tail.as_bytes());
    body
}

pub struct DriveClient {
    http: Client,
    base_url: String,
    upload_url: String,
    token: Box<dyn TokenStore>,
}

impl DriveClient {
    pub fn new(http: Client, token: Box<dyn TokenStore>) -> Self {
        DriveClient {
            http,
            base_url: DRIVE_API.to_string(),
            upload_url: DRIVE_UPLOAD_API.to_string(),
            token,
        }
    }

    /// Point at another server. Uploads go to `{base_url}/upload`.
    pub fn with_base_url(http: Client, token: Box<dyn TokenStore>, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        DriveClient {
            http,
            upload_url: format!("{}/upload", base_url),
            base_url,
            token,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let token = self.token.refresh_if_expired()?;
        Ok(builder.bearer_auth(token.value))
    }

    /// All files matching `query`, following page tokens.
    fn search(&self, query: &str) -> Result<Vec<DriveFile>, ServiceError> {
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.base_url))
                .query(&[
                    ("q", query),
                    ("fields", "nextPageToken, files(id, name)"),
                    ("pageSize", "1000"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = check_status(SERVICE, self.authorized(request)?.send()?)?;
            let page: FileList = response.json()?;
            found.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(found)
    }
}

impl FileStore for DriveClient {
    fn list_files(&self, folder_id: &str) -> Result<BTreeMap<String, String>, ServiceError> {
        let files = self.search(&children_query(folder_id))?;
        log::debug!("{} files in folder {}", files.len(), folder_id);
        Ok(files.into_iter().map(|f| (f.name, f.id)).collect())
    }

    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, ServiceError> {
        let started = Instant::now();
        let request = self
            .http
            .get(format!("{}/files/{}", self.base_url, file_id))
            .query(&[("alt", "media")]);
        let response = check_status(SERVICE, self.authorized(request)?.send()?)?;
        let bytes = response.bytes()?.to_vec();
        log::info!(
            "Downloaded {} bytes in {:.2}s",
            bytes.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(bytes)
    }

    fn move_file(&self, file_id: &str, dest_folder_id: &str) -> Result<(), ServiceError> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        let request = self.http.get(&url).query(&[("fields", "id, parents")]);
        let current: DriveFile = check_status(SERVICE, self.authorized(request)?.send()?)?.json()?;
        let previous = current
            .parents
            .iter()
            .filter(|p| p.as_str() != dest_folder_id)
            .cloned()
            .collect::<Vec<_>>()
            .join(",");

        let request = self
            .http
            .patch(&url)
            .query(&[
                ("addParents", dest_folder_id),
                ("removeParents", previous.as_str()),
                ("fields", "id"),
            ])
            .json(&serde_json::json!({}));
        check_status(SERVICE, self.authorized(request)?.send()?)?;
        log::debug!("Moved {} into {}", file_id, dest_folder_id);
        Ok(())
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, ServiceError> {
        if let Some(existing) = self.search(&folder_query(name, parent_id))?.into_iter().next() {
            return Ok(existing.id);
        }
        let request = self
            .http
            .post(format!("{}/files", self.base_url))
            .query(&[("fields", "id")])
            .json(&serde_json::json!({
                "name": name,
                "mimeType": FOLDER_MIME,
                "parents": [parent_id],
            }));
        let created: DriveFile = check_status(SERVICE, self.authorized(request)?.send()?)?.json()?;
        log::info!("Created folder '{}' ({})", name, created.id);
        Ok(created.id)
    }

    fn upload(
        &self,
        name: &str,
        parent_id: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ServiceError> {
        let started = Instant::now();
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
        });
        let request = self
            .http
            .post(format!("{}/files", self.upload_url))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
            )
            .body(related_body(&metadata, mime_type, bytes));
        let created: DriveFile = check_status(SERVICE, self.authorized(request)?.send()?)?.json()?;
        log::info!(
            "Uploaded {} ({} bytes) in {:.2}s as {}",
            name,
            bytes.len(),
            started.elapsed().as_secs_f64(),
            created.id
        );
        Ok(created.id)
    }
}

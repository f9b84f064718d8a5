//! SoundCloud track uploads.

use crate::error::ServiceError;
use crate::services::{Publisher, Upload, check_status};
use crate::token::TokenStore;
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Instant;

pub const SOUNDCLOUD_API: &str = "https://api.soundcloud.com";
pub const SOUNDCLOUD_TOKEN_URL: &str = "https://api.soundcloud.com/oauth2/token";
const SERVICE: &str = "SoundCloud";

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    permalink_url: Option<String>,
}

/// Space separated, multi-word tags quoted, as the track API expects.
fn tag_list(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.contains(' ') {
                format!("\"{}\"", t.replace('"', ""))
            } else {
                t.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn permalink(body: &str) -> Result<String, ServiceError> {
    let track: TrackResponse = serde_json::from_str(body)?;
    track
        .permalink_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ServiceError::Malformed {
            service: SERVICE,
            detail: "track response has no permalink_url".into(),
        })
}

pub struct SoundCloudClient {
    http: Client,
    base_url: String,
    token: Box<dyn TokenStore>,
}

impl SoundCloudClient {
    pub fn new(http: Client, token: Box<dyn TokenStore>) -> Self {
        SoundCloudClient {
            http,
            base_url: SOUNDCLOUD_API.to_string(),
            token,
        }
    }

    fn form(upload: &Upload) -> Result<Form, ServiceError> {
        let audio = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)?;
        let mut form = Form::new()
            .part("track[asset_data]", audio)
            .text("track[title]", upload.title.clone())
            .text("track[description]", upload.description.clone())
            .text("track[sharing]", upload.visibility.to_string())
            .text("track[downloadable]", upload.downloadable.to_string());
        let tags = tag_list(&upload.tags);
        if !tags.is_empty() {
            form = form.text("track[tag_list]", tags);
        }
        if let Some(artwork) = &upload.artwork {
            let part = Part::bytes(artwork.clone())
                .file_name("artwork.jpg")
                .mime_str("image/jpeg")?;
            form = form.part("track[artwork_data]", part);
        }
        Ok(form)
    }
}

impl Publisher for SoundCloudClient {
    fn publish(&self, upload: &Upload) -> Result<String, ServiceError> {
        let token = self.token.refresh_if_expired()?;
        let started = Instant::now();
        log::info!(
            "Uploading '{}' ({} bytes) to {}",
            upload.title,
            upload.bytes.len(),
            SERVICE
        );
        let response = self
            .http
            .post(format!("{}/tracks", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("OAuth {}", token.value))
            .multipart(Self::form(upload)?)
            .send()?;
        let body = check_status(SERVICE, response)?.text()?;
        let url = permalink(&body)?;
        log::info!(
            "Upload finished in {:.2}s: {}",
            started.elapsed().as_secs_f64(),
            url
        );
        Ok(url)
    }
}

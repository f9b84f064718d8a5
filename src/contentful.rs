//! Contentful as the show [`MetadataStore`].
//!
//! Lookups go through the Content Delivery API with the delivery token.
//! Writing the published link back goes through the Content Management API:
//! the entry is fetched for its version, updated with the new link field
//! under the default locale, and published again.

use crate::error::ServiceError;
use crate::services::{MetadataStore, ShowRecord, check_status};
use chrono::{Duration, NaiveDateTime};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DELIVERY_API: &str = "https://cdn.contentful.com";
pub const MANAGEMENT_API: &str = "https://api.contentful.com";
const SERVICE: &str = "Contentful";
const VERSION_HEADER: &str = "X-Contentful-Version";
const CMA_JSON: &str = "application/vnd.contentful.management.v1+json";
const SLOT_MINUTES: i64 = 15;

/// Content model names. Every field has a default so configs only
/// name what differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentfulFields {
    pub content_type: String,
    pub locale: String,
    pub date_field: String,
    pub title_field: String,
    pub description_field: String,
    pub artwork_field: String,
    pub genres_field: String,
    pub link_field: String,
}

impl Default for ContentfulFields {
    fn default() -> Self {
        ContentfulFields {
            content_type: "show".into(),
            locale: "en-US".into(),
            date_field: "date".into(),
            title_field: "title".into(),
            description_field: "description".into(),
            artwork_field: "artwork".into(),
            genres_field: "genres".into(),
            link_field: "soundcloudLink".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentfulCredentials {
    pub space_id: String,
    pub environment: String,
    pub delivery_token: String,
    pub management_token: String,
}

pub struct ContentfulClient {
    http: Client,
    credentials: ContentfulCredentials,
    fields: ContentfulFields,
}

#[derive(Debug, Deserialize)]
struct Sys {
    #[serde(default)]
    version: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ManagedEntry {
    sys: Sys,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

/// Asset URLs come back protocol-relative.
fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

fn text_field(fields: &Value, name: &str) -> String {
    fields
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Resolve a linked asset id against the `includes.Asset` block of a
/// delivery response.
fn asset_url(body: &Value, asset_id: &str) -> Option<String> {
    body.pointer("/includes/Asset")?
        .as_array()?
        .iter()
        .find(|asset| asset.pointer("/sys/id").and_then(Value::as_str) == Some(asset_id))?
        .pointer("/fields/file/url")
        .and_then(Value::as_str)
        .map(absolute_url)
}

/// First entry of a delivery response, if any.
fn parse_show(body: &Value, names: &ContentfulFields) -> Result<Option<ShowRecord>, ServiceError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::Malformed {
            service: SERVICE,
            detail: "entries response has no items".into(),
        })?;
    let Some(entry) = items.first() else {
        return Ok(None);
    };
    let entry_id = entry
        .pointer("/sys/id")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::Malformed {
            service: SERVICE,
            detail: "entry has no sys.id".into(),
        })?
        .to_string();
    let empty = Value::Null;
    let fields = entry.get("fields").unwrap_or(&empty);

    let artwork_url = fields
        .get(&names.artwork_field)
        .and_then(|link| link.pointer("/sys/id"))
        .and_then(Value::as_str)
        .and_then(|id| asset_url(body, id));
    let genres = fields
        .get(&names.genres_field)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Some(ShowRecord {
        entry_id,
        title: text_field(fields, &names.title_field),
        description: text_field(fields, &names.description_field),
        artwork_url,
        genres,
    }))
}

impl ContentfulClient {
    pub fn new(http: Client, credentials: ContentfulCredentials, fields: ContentfulFields) -> Self {
        ContentfulClient {
            http,
            credentials,
            fields,
        }
    }

    fn space_path(&self, api: &str) -> String {
        format!(
            "{}/spaces/{}/environments/{}",
            api, self.credentials.space_id, self.credentials.environment
        )
    }

    fn entry_url(&self, entry_id: &str) -> String {
        format!("{}/entries/{}", self.space_path(MANAGEMENT_API), entry_id)
    }
}

impl MetadataStore for ContentfulClient {
    fn lookup_show(&self, slot: NaiveDateTime) -> Result<Option<ShowRecord>, ServiceError> {
        let from = slot.format("%Y-%m-%dT%H:%M").to_string();
        let until = (slot + Duration::minutes(SLOT_MINUTES))
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        let date = format!("fields.{}", self.fields.date_field);
        let response = self
            .http
            .get(format!("{}/entries", self.space_path(DELIVERY_API)))
            .bearer_auth(&self.credentials.delivery_token)
            .query(&[
                ("content_type", self.fields.content_type.as_str()),
                (format!("{}[gte]", date).as_str(), from.as_str()),
                (format!("{}[lt]", date).as_str(), until.as_str()),
                ("include", "1"),
                ("limit", "1"),
            ])
            .send()?;
        let body: Value = check_status(SERVICE, response)?.json()?;
        let record = parse_show(&body, &self.fields)?;
        match &record {
            Some(show) => log::info!("Matched slot {} to entry '{}'", from, show.title),
            None => log::info!("No show entry for slot {}", from),
        }
        Ok(record)
    }

    fn update_show_link(&self, entry_id: &str, url: &str) -> Result<(), ServiceError> {
        let entry_url = self.entry_url(entry_id);
        let token = &self.credentials.management_token;

        let response = self.http.get(&entry_url).bearer_auth(token).send()?;
        let mut entry: ManagedEntry = check_status(SERVICE, response)?.json()?;
        let version = entry.sys.version.ok_or_else(|| ServiceError::Malformed {
            service: SERVICE,
            detail: format!("entry {} has no version", entry_id),
        })?;

        let mut localized = serde_json::Map::new();
        localized.insert(self.fields.locale.clone(), Value::from(url));
        entry
            .fields
            .insert(self.fields.link_field.clone(), Value::Object(localized));
        let body = serde_json::to_vec(&serde_json::json!({ "fields": entry.fields }))?;
        let response = self
            .http
            .put(&entry_url)
            .bearer_auth(token)
            .header(VERSION_HEADER, version.to_string())
            .header(reqwest::header::CONTENT_TYPE, CMA_JSON)
            .body(body)
            .send()?;
        let updated: ManagedEntry = check_status(SERVICE, response)?.json()?;
        let version = updated.sys.version.unwrap_or(version + 1);

        let response = self
            .http
            .put(format!("{}/published", entry_url))
            .bearer_auth(token)
            .header(VERSION_HEADER, version.to_string())
            .send()?;
        check_status(SERVICE, response)?;
        log::info!("Published link on entry {}", entry_id);
        Ok(())
    }

    fn fetch_artwork(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.http.get(absolute_url(url)).send()?;
        Ok(check_status(SERVICE, response)?.bytes()?.to_vec())
    }
}

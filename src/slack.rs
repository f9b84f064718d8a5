use crate::error::ServiceError;
use crate::services::{Alerter, check_status};
use reqwest::blocking::Client;

const PREFIX: &str = "Audio automation error\n\n";

/// Posts failure reports to a Slack incoming webhook.
pub struct SlackWebhook {
    http: Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(http: Client, url: String) -> Self {
        SlackWebhook { http, url }
    }
}

fn payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "text": format!("{}{}", PREFIX, message) })
}

impl Alerter for SlackWebhook {
    fn notify_failure(&self, message: &str) {
        let sent = self
            .http
            .post(&self.url)
            .json(&payload(message))
            .send()
            .map_err(ServiceError::from)
            .and_then(|response| check_status("Slack", response));
        if let Err(e) = sent {
            log::warn!("Could not deliver alert to Slack: {}", e);
        }
    }
}

//! Access tokens for the publishing target and the file store.
//!
//! Tokens are owned by a [`TokenStore`] handed to the client that needs them.
//! Refreshed tokens are kept in memory and, when a cache path is set, written
//! to a small JSON file so the next run starts from the newest refresh token.

use crate::error::ServiceError;
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

pub trait TokenStore: Send + Sync {
    /// The current token, without checking expiry.
    fn get_token(&self) -> Result<AccessToken, ServiceError>;
    /// The current token, refreshed first if it is expired or about to be.
    fn refresh_if_expired(&self) -> Result<AccessToken, ServiceError>;
}

/// A token that never changes, e.g. one minted outside this process.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenStore for StaticToken {
    fn get_token(&self) -> Result<AccessToken, ServiceError> {
        if self.0.is_empty() {
            return Err(ServiceError::Auth("no access token configured".into()));
        }
        Ok(AccessToken {
            value: self.0.clone(),
            expires_at: None,
        })
    }

    fn refresh_if_expired(&self) -> Result<AccessToken, ServiceError> {
        self.get_token()
    }
}

/// Persisted OAuth state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenState {
    /// True when the access token is missing or expires within the margin.
    /// A token without a known expiry is trusted until the server rejects it.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) >= at,
            None => false,
        }
    }

    /// Load a cached state, or `None` if there is no usable cache file.
    pub fn load(path: &Path) -> Option<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => return None,
        };
        match serde_json::from_str(&data) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Ignoring corrupt token cache '{}': {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ServiceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Client credentials for a `refresh_token` grant.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token store that refreshes through an OAuth token endpoint.
pub struct OAuthTokenStore {
    service: &'static str,
    http: Client,
    oauth: OAuthClient,
    state: Mutex<TokenState>,
    cache_path: Option<PathBuf>,
}

impl OAuthTokenStore {
    /// Start from `initial`, unless `cache_path` holds a state for the same
    /// client from an earlier run.
    pub fn new(
        service: &'static str,
        http: Client,
        oauth: OAuthClient,
        initial: TokenState,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let state = cache_path
            .as_deref()
            .and_then(TokenState::load)
            .unwrap_or(initial);
        OAuthTokenStore {
            service,
            http,
            oauth,
            state: Mutex::new(state),
            cache_path,
        }
    }

    fn refresh(&self, state: &mut TokenState) -> Result<(), ServiceError> {
        if state.refresh_token.is_empty() {
            return Err(ServiceError::Auth(format!(
                "{} token expired and no refresh token is available",
                self.service
            )));
        }
        log::info!("Refreshing {} access token", self.service);
        let response = self
            .http
            .post(&self.oauth.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", state.refresh_token.as_str()),
            ])
            .send()?;
        let response = crate::services::check_status(self.service, response)
            .map_err(|e| ServiceError::Auth(format!("token refresh failed: {}", e)))?;
        let tokens: TokenResponse = response.json()?;

        state.access_token = tokens.access_token;
        if let Some(refresh) = tokens.refresh_token {
            state.refresh_token = refresh;
        }
        state.expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        if let Some(path) = &self.cache_path {
            if let Err(e) = state.save(path) {
                log::warn!("Could not write token cache '{}': {}", path.display(), e);
            }
        }
        Ok(())
    }

    /// Refresh now, whatever the recorded expiry says.
    pub fn force_refresh(&self) -> Result<AccessToken, ServiceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh(&mut state)?;
        Ok(to_token(&state))
    }
}

fn to_token(state: &TokenState) -> AccessToken {
    AccessToken {
        value: state.access_token.clone(),
        expires_at: state.expires_at,
    }
}

impl TokenStore for OAuthTokenStore {
    fn get_token(&self) -> Result<AccessToken, ServiceError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(to_token(&state))
    }

    fn refresh_if_expired(&self) -> Result<AccessToken, ServiceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.needs_refresh(Utc::now()) {
            self.refresh(&mut state)?;
        }
        Ok(to_token(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(expires_in: Option<i64>) -> TokenState {
        TokenState {
            access_token: "abc".into(),
            refresh_token: "def".into(),
            expires_at: expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        }
    }

    #[test]
    fn refresh_decision() {
        let now = Utc::now();
        assert!(!state(Some(3_600)).needs_refresh(now));
        assert!(state(Some(30)).needs_refresh(now));
        assert!(state(Some(-10)).needs_refresh(now));
        assert!(!state(None).needs_refresh(now));

        let empty = TokenState {
            access_token: String::new(),
            ..state(None)
        };
        assert!(empty.needs_refresh(now));
    }

    #[test]
    fn state_round_trips_through_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let original = state(Some(3_600));
        original.save(&path).unwrap();
        assert_eq!(TokenState::load(&path), Some(original));
    }

    #[test]
    fn corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();
        assert!(TokenState::load(&path).is_none());
        assert!(TokenState::load(&dir.path().join("missing.json")).is_none());
    }

    #[test]
    fn cached_state_wins_over_initial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let cached = TokenState {
            access_token: "cached".into(),
            ..state(Some(3_600))
        };
        cached.save(&path).unwrap();

        let store = OAuthTokenStore::new(
            "test",
            Client::new(),
            OAuthClient {
                token_url: "http://127.0.0.1:9/token".into(),
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            state(Some(3_600)),
            Some(path),
        );
        assert_eq!(store.get_token().unwrap().value, "cached");
        // still valid, so no network round trip happens
        assert_eq!(store.refresh_if_expired().unwrap().value, "cached");
    }

    #[test]
    fn expired_without_refresh_token_is_auth_error() {
        let store = OAuthTokenStore::new(
            "test",
            Client::new(),
            OAuthClient {
                token_url: "http://127.0.0.1:9/token".into(),
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            TokenState {
                access_token: String::new(),
                refresh_token: String::new(),
                expires_at: None,
            },
            None,
        );
        assert!(matches!(store.refresh_if_expired(), Err(ServiceError::Auth(_))));
    }

    #[test]
    fn static_token_requires_a_value() {
        assert_eq!(StaticToken("x".into()).get_token().unwrap().value, "x");
        assert!(StaticToken(String::new()).refresh_if_expired().is_err());
    }
}

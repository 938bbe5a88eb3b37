//! Access-token lifecycle for the signed client.
//!
//! Tokens come from a client-credentials form POST and are cached until
//! shortly before `ValidTo`. The cache lives in a [`Session`] value owned by
//! the client; there is no process-global token.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::types::{ApiError, ServerEnvelope};
use crate::clock::Clock;

/// Token as issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    /// Full header value, usually `Bearer <token>`.
    #[serde(rename = "AccessToken")]
    pub access_token: String,
    /// Partner id echoed in `X-PARTNER-ID`.
    #[serde(rename = "ClientId", default)]
    pub client_id: String,
    #[serde(rename = "ValidFrom", default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(rename = "ValidTo", default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// A token with no expiry is treated as already expired.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.valid_to {
            Some(valid_to) => now < valid_to - margin,
            None => false,
        }
    }
}

/// Client credentials used to obtain tokens.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Cached access token plus the means to refresh it.
pub struct Session {
    http: reqwest::Client,
    credentials: Credentials,
    refresh_margin: Duration,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<AccessToken>>,
}

impl Session {
    pub fn new(
        http: reqwest::Client,
        credentials: Credentials,
        refresh_margin: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            credentials,
            refresh_margin,
            clock,
            current: Mutex::new(None),
        }
    }

    pub fn client_secret(&self) -> &str {
        &self.credentials.client_secret
    }

    /// Cached token, fetching a new one if missing or about to expire.
    pub async fn token(&self) -> Result<AccessToken, ApiError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.is_fresh(self.clock.now_utc(), self.refresh_margin) {
                return Ok(token.clone());
            }
        }
        let token = self.fetch().await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Discard the cached token and fetch a new one.
    pub async fn refresh(&self) -> Result<AccessToken, ApiError> {
        let mut current = self.current.lock().await;
        *current = None;
        let token = self.fetch().await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token (logout).
    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }

    async fn fetch(&self) -> Result<AccessToken, ApiError> {
        tracing::debug!(url = %self.credentials.token_url, "requesting access token");
        let form = [
            ("ClientId", self.credentials.client_id.as_str()),
            ("ClientSecret", self.credentials.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.credentials.token_url)
            .query(&[("GrantType", "client_credentials")])
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let envelope: ServerEnvelope<AccessToken> = response.json().await?;
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("token response has no Data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn token_refreshes_inside_margin() {
        let valid_to = Utc.with_ymd_and_hms(2025, 6, 30, 11, 46, 5).unwrap();
        let token = AccessToken {
            access_token: "Bearer x".into(),
            client_id: "partner".into(),
            valid_from: None,
            valid_to: Some(valid_to),
        };
        let margin = Duration::seconds(60);
        assert!(token.is_fresh(valid_to - Duration::seconds(61), margin));
        assert!(!token.is_fresh(valid_to - Duration::seconds(59), margin));
    }

    #[test]
    fn token_parses_gateway_shape() {
        let raw = r#"{"Status":1,"Data":{"AccessToken":"Bearer abc","ClientId":"p1",
            "ValidFrom":"2025-06-30T10:46:05Z","ValidTo":"2025-06-30T11:46:05Z"}}"#;
        let env: ServerEnvelope<AccessToken> = serde_json::from_str(raw).unwrap();
        let token = env.data.unwrap();
        assert_eq!(token.access_token, "Bearer abc");
        assert_eq!(token.client_id, "p1");
        assert!(token.valid_to.is_some());
    }
}

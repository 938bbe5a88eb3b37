//! Signed HTTP client for the field-sales backend.

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use super::contracts::Contract;
use super::session::{Credentials, Session};
use super::signature::{compute_signature, StringToSign};
use super::types::{
    ApiError, CheckinUpdate, CommentUpdate, EmployeeQuery, EventPayload, NextAction,
    NextActionData, SendReceipt, ServerEnvelope,
};
use crate::capabilities::RemoteApi;
use crate::clock::Clock;
use crate::error::{ConfigError, CoreError};
use crate::storage::ApiConfig;

/// Backend client that signs every request.
///
/// [`RemoteApi::send`] and [`RemoteApi::confirm_site_checkin`] make a
/// single attempt and report `Unauthorized` to their caller, which owns
/// the refresh-and-retry decision. The other calls refresh the token and
/// retry once on their own.
pub struct SignedClient {
    http: reqwest::Client,
    base_url: Url,
    config: ApiConfig,
    session: Arc<Session>,
    clock: Arc<dyn Clock>,
}

impl SignedClient {
    pub fn new(config: &ApiConfig, clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "api.base_url".into(),
            message: e.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::NetworkFailure(e.to_string()))?;

        let session = Arc::new(Session::new(
            http.clone(),
            Credentials {
                token_url: config.token_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.resolved_client_secret(),
            },
            Duration::seconds(config.token_refresh_margin_secs),
            clock.clone(),
        ));

        Ok(Self {
            http,
            base_url,
            config: config.clone(),
            session,
            clock,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Contracts assigned to `employee_id`.
    pub async fn fetch_contracts(&self, employee_id: &str) -> Result<Vec<Contract>, ApiError> {
        let query = EmployeeQuery {
            employee_name: employee_id,
            lease_no: None,
        };
        let envelope: ServerEnvelope<Vec<Contract>> = self
            .call_with_refresh(Method::POST, &self.config.contracts_path, &query)
            .await?;
        if !envelope.is_ok() {
            return Err(ApiError::Rejected {
                status: envelope.status,
                message: envelope.message_or_default(),
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }

    /// Replace the comment on an already checked-in contract.
    pub async fn update_comment(
        &self,
        employee_id: &str,
        lease_no: &str,
        comment: &str,
    ) -> Result<SendReceipt, ApiError> {
        let body = CommentUpdate {
            employee_name: employee_id.to_string(),
            lease_no: lease_no.to_string(),
            comment: comment.to_string(),
            created_date: self.iso_now(),
        };
        let envelope: ServerEnvelope<serde_json::Value> = self
            .call_with_refresh(Method::PUT, &self.config.update_comment_path, &body)
            .await?;
        Ok(receipt(&envelope))
    }

    fn iso_now(&self) -> String {
        self.clock
            .now_utc()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    async fn call_with_refresh<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<ServerEnvelope<T>, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        match self.call(method.clone(), path, body).await {
            Err(ApiError::Unauthorized) => {
                tracing::warn!(path, "unauthorized, retrying once with a fresh token");
                self.session.refresh().await?;
                self.call(method, path, body).await
            }
            other => other,
        }
    }

    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<ServerEnvelope<T>, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let token = self.session.token().await?;
        let body_json = serde_json::to_string(body).map_err(|e| ApiError::Encode(e.to_string()))?;
        let timestamp = self.iso_now();
        let signature = compute_signature(
            &StringToSign {
                method: method.as_str(),
                path,
                access_token: &token.access_token,
                body: &body_json,
                timestamp: &timestamp,
            },
            self.session.client_secret().as_bytes(),
        );

        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::Encode(format!("bad path '{path}': {e}")))?;

        tracing::debug!(%method, path, "calling backend");
        let response = self
            .http
            .request(method, url)
            .header("Authorization", &token.access_token)
            .header("X-PARTNER-ID", &token.client_id)
            .header("X-TIMESTAMP", &timestamp)
            .header("X-SIGNATURE", signature)
            .header("Content-Type", "application/json")
            .body(body_json)
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
        Ok(response.json().await?)
    }
}

fn receipt<T>(envelope: &ServerEnvelope<T>) -> SendReceipt {
    SendReceipt {
        ok: envelope.is_ok(),
        server_status: envelope.status,
        server_message: envelope.message_or_default(),
    }
}

#[async_trait]
impl RemoteApi for SignedClient {
    async fn send(&self, payload: &EventPayload) -> Result<SendReceipt, ApiError> {
        let saved: ServerEnvelope<serde_json::Value> = self
            .call(Method::POST, &self.config.save_checkin_path, payload)
            .await?;
        Ok(receipt(&saved))
    }

    async fn confirm_site_checkin(&self, payload: &EventPayload) -> Result<SendReceipt, ApiError> {
        let update = CheckinUpdate {
            employee_name: payload.employee_name.clone(),
            lease_no: payload.lease_no.clone().unwrap_or_default(),
            comment: payload.comment.clone(),
            latitude: payload.latitude.clone(),
            longitude: payload.longitude.clone(),
            check_in: payload.created_date.clone(),
            created_date: self.iso_now(),
        };
        let updated: ServerEnvelope<serde_json::Value> = self
            .call(Method::PUT, &self.config.update_checkin_path, &update)
            .await?;
        Ok(receipt(&updated))
    }

    async fn query_next_action(&self, employee_id: &str) -> Result<NextAction, ApiError> {
        let query = EmployeeQuery {
            employee_name: employee_id,
            lease_no: None,
        };
        let envelope: ServerEnvelope<NextActionData> = self
            .call_with_refresh(Method::POST, &self.config.next_action_path, &query)
            .await?;
        if !envelope.is_ok() {
            return Err(ApiError::Rejected {
                status: envelope.status,
                message: envelope.message_or_default(),
            });
        }
        let raw = envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("next action missing".into()))?;
        NextAction::parse(raw.raw())
            .ok_or_else(|| ApiError::InvalidResponse(format!("unknown next action '{}'", raw.raw())))
    }

    async fn refresh_credentials(&self) -> Result<(), ApiError> {
        self.session.refresh().await.map(|_| ())
    }
}

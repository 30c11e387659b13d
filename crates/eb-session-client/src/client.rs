// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session API client

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Response};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use url::Url;

use crate::error::{SessionClientError, SessionClientResult};
use crate::types::{CreateSessionRequest, SessionDetails, SessionRoster, SessionSummary};

/// Header carrying the application's REST key.
pub const REST_KEY_HEADER: &str = "otree-rest-key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionClient {
    http_client: HttpClient,
    base_url: Url,
}

impl SessionClient {
    /// Build a client for the application at `base_url`.
    ///
    /// The REST key, when given, is attached to every request. Applications
    /// running in demo mode accept requests without one.
    pub fn new(base_url: Url, rest_key: Option<&str>) -> SessionClientResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = rest_key {
            let mut value = HeaderValue::from_str(key)?;
            value.set_sensitive(true);
            headers.insert(REST_KEY_HEADER, value);
        }

        let http_client = HttpClient::builder()
            .user_agent(concat!("eb-session-client/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn from_url(base_url: &str, rest_key: Option<&str>) -> SessionClientResult<Self> {
        Self::new(Url::parse(base_url)?, rest_key)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Create a session from a session config defined in the application.
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> SessionClientResult<SessionSummary> {
        self.post("/api/sessions", Some(request)).await
    }

    /// Fetch a session with its participants.
    pub async fn get_session(&self, session_code: &str) -> SessionClientResult<SessionDetails> {
        let path = format!("/api/get_session/{}", session_code);
        self.post(&path, None::<&()>).await
    }

    /// Create a session and return the roster agents should join with.
    pub async fn create_session_with_roster(
        &self,
        request: &CreateSessionRequest,
    ) -> SessionClientResult<SessionRoster> {
        let summary = self.create_session(request).await?;
        tracing::info!(
            session = %summary.code,
            config = %request.session_config_name,
            participants = request.num_participants,
            "Created experiment session"
        );

        let details = self.get_session(&summary.code).await?;
        Ok(SessionRoster::from_details(summary.code, &details))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> SessionClientResult<T> {
        let url = self.base_url.join(path)?;
        tracing::debug!(%url, "Session API request");

        let mut request = self.http_client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> SessionClientResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(SessionClientError::from)
        } else {
            Err(SessionClientError::Status { status, body: text })
        }
    }
}

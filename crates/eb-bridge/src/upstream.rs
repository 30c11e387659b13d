// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! HTTP access to the experiment application for one participant
//!
//! Redirects are never followed by the client: the page flow of the
//! application is encoded in them, so the navigator has to see each one.
//! Cookies are kept per client because the application tracks participants
//! through its session cookie.

use reqwest::header::{HeaderName, LOCATION};
use reqwest::{Client as HttpClient, Response, StatusCode, redirect::Policy};
use std::time::Duration;
use url::Url;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Response to a single upstream request.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamResponse {
    /// 3xx with its `Location` resolved to an absolute URL
    Redirect { status: StatusCode, location: Url },
    /// Anything else. The body is left empty on wait pages.
    Page {
        status: StatusCode,
        wait_marker: bool,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: HttpClient,
    base_url: Url,
    wait_header: HeaderName,
}

impl UpstreamClient {
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let wait_header = config.markers.wait_header_name().map_err(|err| {
            BridgeError::Config(format!("invalid wait-page-header: {}", err))
        })?;

        let http = HttpClient::builder()
            .redirect(Policy::none())
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url: config.experiment_url.clone(),
            wait_header,
        })
    }

    /// Resolve a `Location` value against the application base URL.
    pub fn resolve(&self, location: &str) -> BridgeResult<Url> {
        Ok(self.base_url.join(location)?)
    }

    pub async fn get(&self, url: &Url, timeout: Duration) -> BridgeResult<UpstreamResponse> {
        tracing::trace!(%url, "GET");
        let response = self.http.get(url.clone()).timeout(timeout).send().await?;
        self.read(url, response).await
    }

    /// POST `form` url-encoded; an empty form still sends a form body.
    pub async fn post_form(
        &self,
        url: &Url,
        form: &[(String, String)],
        timeout: Duration,
    ) -> BridgeResult<UpstreamResponse> {
        tracing::trace!(%url, fields = form.len(), "POST");
        let response = self.http.post(url.clone()).form(form).timeout(timeout).send().await?;
        self.read(url, response).await
    }

    async fn read(&self, url: &Url, response: Response) -> BridgeResult<UpstreamResponse> {
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| BridgeError::UpstreamUnexpectedResponse {
                    url: url.clone(),
                    reason: format!("{} without a Location header", status),
                })?;
            return Ok(UpstreamResponse::Redirect {
                status,
                location: self.resolve(location)?,
            });
        }

        if response.headers().contains_key(&self.wait_header) {
            return Ok(UpstreamResponse::Page {
                status,
                wait_marker: true,
                body: String::new(),
            });
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(BridgeError::UpstreamStatus {
                url: url.clone(),
                status,
            });
        }

        let body = response.text().await?;
        Ok(UpstreamResponse::Page {
            status,
            wait_marker: false,
            body,
        })
    }
}

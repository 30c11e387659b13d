// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Action submitter

use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use crate::config::NavigationConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::session::{NavigationState, ParticipantSession};
use crate::upstream::UpstreamResponse;

#[derive(Debug, Clone)]
pub struct ActionSubmitter {
    request_timeout: Duration,
}

impl ActionSubmitter {
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
        }
    }

    /// Submit `values` for the page at the cursor.
    ///
    /// Values are checked against the discovered schema before anything is
    /// sent. The application must answer with a redirect, whose target
    /// becomes the new cursor; the schema is cleared since it described the
    /// page just left. On any failure cursor and schema stay as they were.
    pub async fn submit(
        &self,
        session: &ParticipantSession,
        state: &mut NavigationState,
        values: &Map<String, Value>,
    ) -> BridgeResult<Url> {
        let form = state.schema.encode(values)?;
        let upstream = session
            .upstream()
            .ok_or_else(|| BridgeError::SessionNotFound(session.participant_code().to_string()))?;

        let url = state.cursor_url.clone();
        tracing::debug!(
            participant = %session.participant_code(),
            %url,
            schema_version = state.schema.version(),
            "Submitting action"
        );

        match upstream.post_form(&url, &form, self.request_timeout).await? {
            UpstreamResponse::Redirect { location, .. } => {
                state.cursor_url = location.clone();
                state.schema.clear();
                Ok(location)
            }
            UpstreamResponse::Page { status, .. } => Err(BridgeError::UpstreamUnexpectedResponse {
                url,
                reason: format!("submission answered {} instead of a redirect", status),
            }),
        }
    }
}

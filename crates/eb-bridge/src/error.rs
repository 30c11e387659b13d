// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bridge error types
//!
//! Every error that ends up in front of an agent is rendered through its
//! `Display` text inside an `{"type":"error"}` message. None of them stop the
//! bridge; the worst outcome is one participant's navigation being aborted.

use eb_wire::WireError;
use reqwest::StatusCode;
use url::Url;

use crate::schema::SchemaViolation;

/// Bridge result type
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0}")]
    MalformedMessage(String),

    #[error("Session not found for participant {0}")]
    SessionNotFound(String),

    #[error("Participant {0} already has an active session")]
    DuplicateParticipant(String),

    #[error("Connection already joined as participant {0}")]
    AlreadyJoined(String),

    #[error("Participant id {got} does not belong to participant {code}")]
    ParticipantMismatch { code: String, got: i64 },

    #[error("Navigation already in progress for participant {0}")]
    NavigationInProgress(String),

    #[error("Submitted fields do not match the current page: {0}")]
    SchemaMismatch(SchemaViolation),

    #[error("Unexpected response from {url}: {reason}")]
    UpstreamUnexpectedResponse { url: Url, reason: String },

    #[error("Experiment server answered {status} for {url}")]
    UpstreamStatus { url: Url, status: StatusCode },

    #[error("Still on wait page {url} after {polls} polls")]
    PollingTimeout { url: Url, polls: u32 },

    #[error("Unrecognized page at {0}")]
    UnrecognizedPage(Url),

    #[error("Gave up at {url} after {hops} page transitions")]
    RedirectLimit { url: Url, hops: u32 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WireError> for BridgeError {
    fn from(err: WireError) -> Self {
        BridgeError::MalformedMessage(err.to_string())
    }
}

impl From<SchemaViolation> for BridgeError {
    fn from(violation: SchemaViolation) -> Self {
        BridgeError::SchemaMismatch(violation)
    }
}

impl BridgeError {
    /// Short stable name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::MalformedMessage(_) => "malformed_message",
            BridgeError::SessionNotFound(_) => "session_not_found",
            BridgeError::DuplicateParticipant(_) => "duplicate_participant",
            BridgeError::AlreadyJoined(_) => "already_joined",
            BridgeError::ParticipantMismatch { .. } => "participant_mismatch",
            BridgeError::NavigationInProgress(_) => "navigation_in_progress",
            BridgeError::SchemaMismatch(_) => "schema_mismatch",
            BridgeError::UpstreamUnexpectedResponse { .. } => "upstream_unexpected_response",
            BridgeError::UpstreamStatus { .. } => "upstream_status",
            BridgeError::PollingTimeout { .. } => "polling_timeout",
            BridgeError::UnrecognizedPage(_) => "unrecognized_page",
            BridgeError::RedirectLimit { .. } => "redirect_limit",
            BridgeError::Http(_) => "http",
            BridgeError::InvalidUrl(_) => "invalid_url",
            BridgeError::Config(_) => "config",
            BridgeError::Io(_) => "io",
        }
    }
}

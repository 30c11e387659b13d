// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use reqwest::StatusCode;
use thiserror::Error;

pub type SessionClientResult<T> = Result<T, SessionClientError>;

#[derive(Debug, Error)]
pub enum SessionClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("REST key is not a valid header value")]
    InvalidRestKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Experiment server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

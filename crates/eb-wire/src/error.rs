// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Errors raised while decoding inbound messages

use thiserror::Error;

pub type WireResult<T> = Result<T, WireError>;

/// Reasons an inbound frame cannot be turned into a message.
///
/// The `Display` text is sent back to the agent verbatim.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Invalid JSON")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Message must be a JSON object")]
    NotAnObject,

    #[error("Message type is required")]
    MissingType,

    #[error("Participant code and ID are required for {0} message.")]
    MissingParticipant(&'static str),

    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

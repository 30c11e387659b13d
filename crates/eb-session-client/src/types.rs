// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request and response bodies of the session API

use eb_wire::Participant;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub session_config_name: String,
    pub num_participants: u32,
    /// Overrides applied on top of the named session config
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub modified_session_config_fields: Map<String, Value>,
}

impl CreateSessionRequest {
    pub fn new(session_config_name: impl Into<String>, num_participants: u32) -> Self {
        Self {
            session_config_name: session_config_name.into(),
            num_participants,
            modified_session_config_fields: Map::new(),
        }
    }
}

/// Response of `POST /api/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub admin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_wide_url: Option<String>,
}

/// Response of `POST /api/get_session/<code>`; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetails {
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub code: String,
    pub id_in_session: i64,
    #[serde(default)]
    pub label: Option<String>,
}

impl From<&ParticipantRecord> for Participant {
    fn from(record: &ParticipantRecord) -> Self {
        Participant::new(record.code.clone(), record.id_in_session)
    }
}

/// A created session and the participants agents should join as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRoster {
    pub session_code: String,
    pub participants: Vec<Participant>,
}

impl SessionRoster {
    pub fn from_details(session_code: impl Into<String>, details: &SessionDetails) -> Self {
        let mut participants: Vec<Participant> =
            details.participants.iter().map(Participant::from).collect();
        participants.sort_by_key(|participant| participant.participant_id);
        Self {
            session_code: session_code.into(),
            participants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_omits_empty_overrides() {
        let body = serde_json::to_value(CreateSessionRequest::new("public_goods_simple", 3)).unwrap();
        assert_eq!(
            body,
            json!({"session_config_name": "public_goods_simple", "num_participants": 3})
        );
    }

    #[test]
    fn roster_is_ordered_by_id_in_session() {
        let details: SessionDetails = serde_json::from_value(json!({
            "config": {"name": "public_goods_simple"},
            "participants": [
                {"code": "zx81", "id_in_session": 2, "label": null},
                {"code": "ab12", "id_in_session": 1}
            ]
        }))
        .unwrap();
        let roster = SessionRoster::from_details("sess01", &details);
        assert_eq!(
            roster.participants,
            vec![Participant::new("ab12", 1), Participant::new("zx81", 2)]
        );
    }
}

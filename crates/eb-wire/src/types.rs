// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inbound and outbound message types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{WireError, WireResult};

/// `type` value that marks a join message. Every other type is a task.
pub const JOIN_TYPE: &str = "join";

/// A participant of an experiment session, as listed in a session roster and
/// as identified in every inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub participant_code: String,
    pub participant_id: i64,
}

impl Participant {
    pub fn new(participant_code: impl Into<String>, participant_id: i64) -> Self {
        Self {
            participant_code: participant_code.into(),
            participant_id,
        }
    }
}

/// Form submission requested by an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    /// Free-form `type` string sent by the agent (e.g. `"contribute"`).
    pub kind: String,
    pub participant: Participant,
    /// Field values keyed by form field name, envelope keys removed.
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Join(Participant),
    Task(TaskRequest),
}

impl InboundMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> WireResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(WireError::InvalidJson)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> WireResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(WireError::NotAnObject);
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => {
                return Err(WireError::InvalidField {
                    field: "type",
                    expected: "a string",
                })
            }
            None => return Err(WireError::MissingType),
        };

        let context = if kind == JOIN_TYPE { "join" } else { "task" };
        let participant = take_participant(&mut object, context)?;

        if kind == JOIN_TYPE {
            Ok(InboundMessage::Join(participant))
        } else {
            Ok(InboundMessage::Task(TaskRequest {
                kind,
                participant,
                values: object,
            }))
        }
    }

    pub fn participant(&self) -> &Participant {
        match self {
            InboundMessage::Join(participant) => participant,
            InboundMessage::Task(task) => &task.participant,
        }
    }

    /// Encode the message the way an agent sends it.
    pub fn to_json(&self) -> Value {
        let (kind, participant, values) = match self {
            InboundMessage::Join(participant) => (JOIN_TYPE, participant, None),
            InboundMessage::Task(task) => (task.kind.as_str(), &task.participant, Some(&task.values)),
        };

        let mut object = values.cloned().unwrap_or_default();
        object.insert("type".into(), Value::from(kind));
        object.insert(
            "participant_code".into(),
            Value::from(participant.participant_code.clone()),
        );
        object.insert("participant_id".into(), Value::from(participant.participant_id));
        Value::Object(object)
    }
}

fn take_participant(object: &mut Map<String, Value>, context: &'static str) -> WireResult<Participant> {
    let code = object.remove("participant_code");
    let id = object.remove("participant_id");

    let (Some(code), Some(id)) = (code, id) else {
        return Err(WireError::MissingParticipant(context));
    };

    let participant_code = match code {
        Value::String(code) if !code.trim().is_empty() => code,
        Value::String(_) | Value::Null => return Err(WireError::MissingParticipant(context)),
        _ => {
            return Err(WireError::InvalidField {
                field: "participant_code",
                expected: "a string",
            })
        }
    };

    let participant_id = match id {
        Value::Null => return Err(WireError::MissingParticipant(context)),
        other => other.as_i64().ok_or(WireError::InvalidField {
            field: "participant_id",
            expected: "an integer",
        })?,
    };

    Ok(Participant {
        participant_code,
        participant_id,
    })
}

/// Kind of a bridge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A game round opened (emitted by game servers sharing this vocabulary)
    RoundStarted,
    /// The participant reached a page that needs input
    PhaseTransition,
    /// An informational page with results was passed
    RoundResult,
    /// The participant finished the experiment
    GameOver,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RoundStarted => "round-started",
            EventType::PhaseTransition => "phase-transition",
            EventType::RoundResult => "round-result",
            EventType::GameOver => "game-over",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message sent from the bridge to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Event {
        #[serde(rename = "eventType")]
        event_type: EventType,
        data: Value,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    pub fn event(event_type: EventType, data: Value) -> Self {
        OutboundMessage::Event { event_type, data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundMessage::Error {
            message: message.into(),
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        match self {
            OutboundMessage::Event { event_type, .. } => Some(*event_type),
            OutboundMessage::Error { .. } => None,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            OutboundMessage::Event { data, .. } => Some(data),
            OutboundMessage::Error { .. } => None,
        }
    }
}

/// Typed view of a `phase-transition` event's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseData {
    pub participant_id: i64,
    pub phase: u64,
    pub required_fields: Vec<String>,
    /// The page's state payload
    #[serde(flatten)]
    pub state: Map<String, Value>,
}

/// Data of a `game-over` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverData {
    pub message: String,
}

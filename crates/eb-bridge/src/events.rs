// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Outbound events
//!
//! Formatting is kept in free functions so the exact message shapes can be
//! checked without a connection. Delivery goes through an [`EventSink`], which
//! never fails loudly: a closed connection only produces a warning.

use eb_wire::{EventType, OutboundMessage, Participant};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const GAME_OVER_MESSAGE: &str = "Experiment completed";

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    connection: Arc<str>,
}

impl EventSink {
    /// Create a sink for `connection` and the receiver its writer drains.
    pub fn channel(connection: &str) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            connection: Arc::from(connection),
        };
        (sink, rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection
    }

    /// Queue `message`; returns false if the connection is gone.
    pub fn send(&self, message: OutboundMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                tracing::warn!(
                    connection = %self.connection,
                    event = ?message.event_type(),
                    "Connection closed, dropping outbound message"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Event sink bound to one participant.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    participant: Participant,
    sink: EventSink,
}

impl EventPublisher {
    pub fn new(participant: Participant, sink: EventSink) -> Self {
        Self { participant, sink }
    }

    pub fn phase_transition(&self, phase: u64, fields: &[String], state: &Value) -> bool {
        self.sink.send(phase_transition_event(
            self.participant.participant_id,
            phase,
            fields,
            state,
        ))
    }

    pub fn round_result(&self, state: &Value) -> bool {
        self.sink.send(round_result_event(state))
    }

    pub fn game_over(&self) -> bool {
        self.sink.send(game_over_event())
    }

    pub fn error(&self, message: impl Display) -> bool {
        self.sink.send(error_event(message))
    }
}

/// `phase-transition` event: the page state plus phase, field list and
/// participant id. The bridge's keys replace same-named state keys.
pub fn phase_transition_event(
    participant_id: i64,
    phase: u64,
    fields: &[String],
    state: &Value,
) -> OutboundMessage {
    let mut data = state_object(state);
    data.insert("participant_id".into(), Value::from(participant_id));
    data.insert("phase".into(), Value::from(phase));
    data.insert(
        "required_fields".into(),
        Value::Array(fields.iter().cloned().map(Value::String).collect()),
    );
    OutboundMessage::event(EventType::PhaseTransition, Value::Object(data))
}

/// `round-result` event carrying the page state verbatim.
pub fn round_result_event(state: &Value) -> OutboundMessage {
    OutboundMessage::event(EventType::RoundResult, state.clone())
}

pub fn game_over_event() -> OutboundMessage {
    let mut data = Map::new();
    data.insert("message".into(), Value::from(GAME_OVER_MESSAGE));
    OutboundMessage::event(EventType::GameOver, Value::Object(data))
}

pub fn error_event(message: impl Display) -> OutboundMessage {
    OutboundMessage::error(message.to_string())
}

fn state_object(state: &Value) -> Map<String, Value> {
    match state {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("state".into(), other.clone());
            map
        }
    }
}

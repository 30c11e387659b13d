// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Connection lifecycle
//!
//! A [`Connection`] is the per-socket state machine. It decodes inbound
//! frames, creates sessions on join, hands task values to the submitter and
//! guarantees that the session it created is released when the socket goes
//! away.
//!
//! Navigation runs on spawned tasks that own the session's navigation lock,
//! so the socket keeps being read (and a close is noticed) while a
//! participant sits on a wait page. A second request for a participant whose
//! navigation is still running is rejected, never queued.

use eb_wire::{InboundMessage, Participant, TaskRequest};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::events::{EventPublisher, EventSink, error_event};
use crate::navigator::NavigationOutcome;
use crate::session::{NavigationGuard, ParticipantSession};
use crate::state::AppState;

pub struct Connection {
    state: AppState,
    sink: EventSink,
    joined: Option<Arc<ParticipantSession>>,
}

impl Connection {
    pub fn new(state: AppState, sink: EventSink) -> Self {
        Self {
            state,
            sink,
            joined: None,
        }
    }

    pub fn id(&self) -> &str {
        self.sink.connection_id()
    }

    /// Participant code of the session this connection created, if any.
    pub fn joined_code(&self) -> Option<&str> {
        self.joined.as_deref().map(ParticipantSession::participant_code)
    }

    /// Handle one text frame. Failures are reported to the agent, never
    /// returned: the connection stays open whatever the frame contained.
    pub async fn handle_text(&mut self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(message) => self.handle_message(message).await,
            Err(err) => self.reject(err.into()),
        }
    }

    pub async fn handle_message(&mut self, message: InboundMessage) {
        let result = match message {
            InboundMessage::Join(participant) => self.join(participant).await,
            InboundMessage::Task(task) => self.task(task).await,
        };
        if let Err(err) = result {
            self.reject(err);
        }
    }

    pub fn reject_binary(&self) {
        self.reject(BridgeError::MalformedMessage(
            "Binary frames are not supported, send JSON text".to_string(),
        ));
    }

    fn reject(&self, err: BridgeError) {
        tracing::warn!(connection = %self.id(), kind = err.kind(), error = %err, "Rejected message");
        self.sink.send(error_event(&err));
    }

    async fn join(&mut self, participant: Participant) -> BridgeResult<()> {
        if let Some(current) = &self.joined {
            if !current.is_closed() && self.state.registry.contains(current).await {
                return Err(BridgeError::AlreadyJoined(current.participant_code().to_string()));
            }
        }

        let events = EventPublisher::new(participant.clone(), self.sink.clone());
        let session = Arc::new(ParticipantSession::start(self.state.config(), participant, events)?);
        let guard = session.try_begin_navigation()?;

        let displaced = self
            .state
            .registry
            .insert(session.clone(), self.state.config.rejoin_policy)
            .await?;
        if let Some(displaced) = &displaced {
            tracing::warn!(
                connection = %self.id(),
                participant = %displaced.participant_code(),
                "Participant joined again, closing the previous session"
            );
            displaced.close();
        }

        tracing::info!(
            connection = %self.id(),
            participant = %session.participant_code(),
            participant_id = session.participant_id(),
            "Participant joined"
        );
        self.joined = Some(session.clone());

        tokio::spawn(run_join(self.state.clone(), session, guard, displaced));
        Ok(())
    }

    async fn task(&mut self, task: TaskRequest) -> BridgeResult<()> {
        let code = &task.participant.participant_code;
        let session = match self.state.registry.get(code).await {
            Some(session) if !session.is_closed() => session,
            _ => return Err(BridgeError::SessionNotFound(code.clone())),
        };

        if session.participant_id() != task.participant.participant_id {
            return Err(BridgeError::ParticipantMismatch {
                code: code.clone(),
                got: task.participant.participant_id,
            });
        }

        let guard = session.try_begin_navigation()?;
        tracing::debug!(connection = %self.id(), participant = %code, kind = %task.kind, "Task accepted");
        tokio::spawn(run_task(self.state.clone(), session, guard, task, self.sink.clone()));
        Ok(())
    }

    /// Release the session this connection created. Idempotent.
    pub async fn close(&mut self) {
        if let Some(session) = self.joined.take() {
            self.state.registry.release(&session).await;
        }
    }
}

/// Navigate a new session to its first stopping point.
///
/// A displaced session for the same code may still have a request in flight;
/// the new session makes no request until that navigation has stopped.
async fn run_join(
    state: AppState,
    session: Arc<ParticipantSession>,
    mut guard: NavigationGuard,
    displaced: Option<Arc<ParticipantSession>>,
) {
    if let Some(displaced) = displaced {
        displaced.wait_idle().await;
        tracing::debug!(participant = %session.participant_code(), "Previous session stopped");
    }

    match state.navigator.advance(&session, &mut guard).await {
        Ok(outcome) => finish(&state, &session, outcome).await,
        Err(err) => {
            tracing::error!(
                participant = %session.participant_code(),
                kind = err.kind(),
                error = %err,
                "Join failed"
            );
            state.registry.release(&session).await;
            session.events().error(format!("Error during join process: {}", err));
        }
    }
}

async fn run_task(
    state: AppState,
    session: Arc<ParticipantSession>,
    mut guard: NavigationGuard,
    task: TaskRequest,
    reply: EventSink,
) {
    let result: BridgeResult<NavigationOutcome> = async {
        if guard.schema.is_pending() {
            state.submitter.submit(&session, &mut guard, &task.values).await?;
        } else {
            tracing::info!(
                participant = %session.participant_code(),
                url = %guard.cursor_url,
                "No action pending, resuming navigation"
            );
        }
        state.navigator.advance(&session, &mut guard).await
    }
    .await;

    match result {
        Ok(outcome) => finish(&state, &session, outcome).await,
        Err(err) => {
            tracing::error!(
                participant = %session.participant_code(),
                kind = err.kind(),
                error = %err,
                "Task failed"
            );
            reply.send(error_event(&err));
        }
    }
}

async fn finish(state: &AppState, session: &Arc<ParticipantSession>, outcome: NavigationOutcome) {
    match outcome {
        NavigationOutcome::AwaitingAction { phase } => {
            tracing::debug!(participant = %session.participant_code(), phase, "Waiting for agent");
        }
        NavigationOutcome::Completed => {
            state.registry.release(session).await;
        }
        NavigationOutcome::Cancelled => {
            tracing::debug!(participant = %session.participant_code(), "Navigation stopped, session closed");
        }
    }
}

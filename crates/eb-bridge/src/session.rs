// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-participant session state

use eb_wire::Participant;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use url::Url;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::events::EventPublisher;
use crate::schema::FieldSchema;
use crate::upstream::UpstreamClient;

/// Where a participant stands in the experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    /// Last location reached
    pub cursor_url: Url,
    /// Fields of the page at `cursor_url`
    pub schema: FieldSchema,
    /// Action pages reached so far; never decreases
    pub phase_counter: u64,
}

impl NavigationState {
    pub fn new(cursor_url: Url) -> Self {
        Self {
            cursor_url,
            schema: FieldSchema::new(),
            phase_counter: 0,
        }
    }
}

/// Exclusive access to a session's navigation state.
pub type NavigationGuard = OwnedMutexGuard<NavigationState>;

/// One joined participant.
///
/// The HTTP client belongs to the session and is dropped exactly once by
/// [`ParticipantSession::close`]. The event publisher only references the
/// connection; the transport owns its lifetime.
#[derive(Debug)]
pub struct ParticipantSession {
    participant: Participant,
    events: EventPublisher,
    upstream: Mutex<Option<UpstreamClient>>,
    navigation: Arc<AsyncMutex<NavigationState>>,
}

impl ParticipantSession {
    pub fn new(participant: Participant, events: EventPublisher, upstream: UpstreamClient, start_url: Url) -> Self {
        Self {
            participant,
            events,
            upstream: Mutex::new(Some(upstream)),
            navigation: Arc::new(AsyncMutex::new(NavigationState::new(start_url))),
        }
    }

    /// Session positioned at the participant's start URL with a fresh client.
    pub fn start(config: &BridgeConfig, participant: Participant, events: EventPublisher) -> BridgeResult<Self> {
        let start_url = start_url(config, &participant.participant_code)?;
        let upstream = UpstreamClient::new(config)?;
        Ok(Self::new(participant, events, upstream, start_url))
    }

    pub fn participant_code(&self) -> &str {
        &self.participant.participant_code
    }

    pub fn participant_id(&self) -> i64 {
        self.participant.participant_id
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// The HTTP client, or `None` once the session is closed.
    pub fn upstream(&self) -> Option<UpstreamClient> {
        self.upstream.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Take the navigation lock without waiting.
    pub fn try_begin_navigation(&self) -> BridgeResult<NavigationGuard> {
        self.navigation
            .clone()
            .try_lock_owned()
            .map_err(|_| BridgeError::NavigationInProgress(self.participant.participant_code.clone()))
    }

    /// Wait until no navigation holds the lock.
    pub async fn wait_idle(&self) {
        drop(self.navigation.lock().await);
    }

    /// Drop the HTTP client. Returns true only for the call that closed it.
    pub fn close(&self) -> bool {
        let client = self.upstream.lock().unwrap_or_else(PoisonError::into_inner).take();
        if client.is_some() {
            tracing::debug!(participant = %self.participant.participant_code, "Closed participant HTTP client");
        }
        client.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.upstream.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

/// `<experiment-url><join-path><participant_code>`
pub fn start_url(config: &BridgeConfig, participant_code: &str) -> BridgeResult<Url> {
    let mut url = config.experiment_url.join(&config.navigation.join_path)?;
    url.path_segments_mut()
        .map_err(|_| BridgeError::Config(format!("{} cannot be used as a base URL", config.experiment_url)))?
        .pop_if_empty()
        .push(participant_code);
    Ok(url)
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Participant session registry

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RejoinPolicy;
use crate::error::{BridgeError, BridgeResult};
use crate::session::ParticipantSession;

/// Live sessions keyed by participant code.
///
/// This is the only structure shared between participants. Removal is by
/// session instance, so cleanup of a replaced session cannot evict the
/// session that replaced it.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<ParticipantSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session`, applying `policy` if its code is already live.
    ///
    /// Returns the displaced session under [`RejoinPolicy::Replace`]; the
    /// caller is expected to close it.
    pub async fn insert(
        &self,
        session: Arc<ParticipantSession>,
        policy: RejoinPolicy,
    ) -> BridgeResult<Option<Arc<ParticipantSession>>> {
        let code = session.participant_code().to_string();
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&code) && policy == RejoinPolicy::Reject {
            return Err(BridgeError::DuplicateParticipant(code));
        }
        Ok(sessions.insert(code, session))
    }

    pub async fn get(&self, participant_code: &str) -> Option<Arc<ParticipantSession>> {
        self.sessions.read().await.get(participant_code).cloned()
    }

    /// Whether this exact session instance is registered.
    pub async fn contains(&self, session: &Arc<ParticipantSession>) -> bool {
        self.sessions
            .read()
            .await
            .get(session.participant_code())
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Unregister `session` if it is still the registered instance.
    pub async fn remove(&self, session: &Arc<ParticipantSession>) -> bool {
        let mut sessions = self.sessions.write().await;
        let registered = sessions
            .get(session.participant_code())
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if registered {
            sessions.remove(session.participant_code());
        }
        registered
    }

    /// Unregister and close `session`. Safe to call any number of times.
    pub async fn release(&self, session: &Arc<ParticipantSession>) -> bool {
        let removed = self.remove(session).await;
        let closed = session.close();
        if removed || closed {
            tracing::info!(
                participant = %session.participant_code(),
                removed,
                closed,
                "Released participant session"
            );
        }
        removed || closed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::events::{EventPublisher, EventSink};
    use eb_wire::Participant;

    fn session(code: &str) -> Arc<ParticipantSession> {
        let participant = Participant::new(code, 1);
        let (sink, _rx) = EventSink::channel("conn-test");
        let events = EventPublisher::new(participant.clone(), sink);
        Arc::new(ParticipantSession::start(&BridgeConfig::default(), participant, events).unwrap())
    }

    #[tokio::test]
    async fn insert_lookup_release() {
        let registry = SessionRegistry::new();
        let alice = session("alice");

        assert!(registry.insert(alice.clone(), RejoinPolicy::Reject).await.unwrap().is_none());
        assert!(Arc::ptr_eq(&registry.get("alice").await.unwrap(), &alice));
        assert_eq!(registry.len().await, 1);

        assert!(registry.release(&alice).await);
        assert!(registry.get("alice").await.is_none());
        assert!(alice.is_closed());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let registry = SessionRegistry::new();
        let alice = session("alice");
        registry.insert(alice.clone(), RejoinPolicy::Replace).await.unwrap();

        assert!(registry.release(&alice).await);
        assert!(!registry.release(&alice).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn reject_policy_refuses_second_join() {
        let registry = SessionRegistry::new();
        registry.insert(session("bob"), RejoinPolicy::Reject).await.unwrap();

        let err = registry.insert(session("bob"), RejoinPolicy::Reject).await.unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateParticipant(code) if code == "bob"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn replaced_session_cleanup_leaves_successor() {
        let registry = SessionRegistry::new();
        let first = session("carol");
        let second = session("carol");

        registry.insert(first.clone(), RejoinPolicy::Replace).await.unwrap();
        let displaced = registry.insert(second.clone(), RejoinPolicy::Replace).await.unwrap();
        assert!(Arc::ptr_eq(&displaced.unwrap(), &first));

        assert!(!registry.contains(&first).await);
        registry.release(&first).await;
        assert!(registry.contains(&second).await);
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn concurrent_joins_of_different_participants() {
        let registry = SessionRegistry::new();
        let mut handles = Vec::new();
        for index in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let session = session(&format!("p{index}"));
                registry.insert(session.clone(), RejoinPolicy::Reject).await.unwrap();
                session
            }));
        }
        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }
        assert_eq!(registry.len().await, 32);

        for session in &sessions {
            registry.release(session).await;
        }
        assert!(registry.is_empty().await);
    }
}

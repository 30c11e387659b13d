// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Navigation engine
//!
//! Walks a participant forward through the experiment until a page needs
//! input, the experiment ends, or something unexpected comes back:
//!
//! - redirects move the cursor and are followed one by one
//! - wait pages are polled at the same URL with a fixed delay
//! - informational pages are reported and clicked through with an empty form
//! - action pages bump the phase, publish the field list and stop
//!
//! Callers hold the session's navigation lock for the whole call.

use url::Url;

use crate::config::{BridgeConfig, NavigationConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::page::{PageClassification, PageInterpreter};
use crate::session::{NavigationState, ParticipantSession};
use crate::upstream::UpstreamResponse;

/// How an advance ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Suspended on an action page; `phase` is the new phase counter
    AwaitingAction { phase: u64 },
    /// The terminal page was reached, the session closed and `game-over`
    /// published
    Completed,
    /// The session was closed mid-way; nothing more was published
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    interpreter: PageInterpreter,
    config: NavigationConfig,
}

impl Navigator {
    pub fn new(interpreter: PageInterpreter, config: NavigationConfig) -> Self {
        Self {
            interpreter,
            config,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            PageInterpreter::new(config.markers.clone()),
            config.navigation.clone(),
        )
    }

    /// Advance from `state.cursor_url` to the next stopping point.
    pub async fn advance(
        &self,
        session: &ParticipantSession,
        state: &mut NavigationState,
    ) -> BridgeResult<NavigationOutcome> {
        let participant = session.participant_code();
        let mut hops = 0u32;
        let mut polls = 0u32;

        loop {
            let Some(upstream) = session.upstream() else {
                return Ok(NavigationOutcome::Cancelled);
            };

            let url = state.cursor_url.clone();
            if self.interpreter.is_terminal_url(&url) {
                return Ok(self.complete(session, state));
            }

            // Only a wait page already seen may be held open by the server.
            let timeout = if polls > 0 {
                self.config.poll_timeout()
            } else {
                self.config.request_timeout()
            };
            let response = upstream.get(&url, timeout).await?;
            if session.is_closed() {
                return Ok(NavigationOutcome::Cancelled);
            }

            let (wait_marker, body) = match response {
                UpstreamResponse::Redirect { location, .. } => {
                    self.hop(state, location, &mut hops)?;
                    polls = 0;
                    continue;
                }
                UpstreamResponse::Page {
                    wait_marker, body, ..
                } => (wait_marker, body),
            };

            let page = self.interpreter.classify(&url, wait_marker, &body);
            tracing::trace!(%participant, %url, page = page.name(), "Classified page");
            match page {
                PageClassification::WaitBarrier => {
                    if polls >= self.config.max_barrier_polls {
                        tracing::warn!(%participant, %url, polls, "Wait page did not release the participant");
                        return Err(BridgeError::PollingTimeout { url, polls });
                    }
                    polls += 1;
                    tracing::debug!(%participant, %url, poll = polls, "On wait page");
                    tokio::time::sleep(self.config.barrier_poll_interval()).await;
                }
                PageClassification::ActionPage { fields, state: payload } => {
                    state.phase_counter += 1;
                    state.schema.replace(fields);
                    let phase = state.phase_counter;
                    tracing::info!(
                        %participant,
                        %url,
                        phase,
                        fields = ?state.schema.fields(),
                        "Reached action page"
                    );
                    session.events().phase_transition(phase, state.schema.fields(), &payload);
                    return Ok(NavigationOutcome::AwaitingAction { phase });
                }
                PageClassification::InformationalPage { state: payload } => {
                    state.schema.clear();
                    tracing::debug!(%participant, %url, "Clicking through informational page");
                    session.events().round_result(&payload);

                    let response = upstream
                        .post_form(&url, &[], self.config.request_timeout())
                        .await?;
                    match response {
                        UpstreamResponse::Redirect { location, .. } => {
                            self.hop(state, location, &mut hops)?;
                            polls = 0;
                        }
                        UpstreamResponse::Page { status, .. } => {
                            return Err(BridgeError::UpstreamUnexpectedResponse {
                                url,
                                reason: format!("click-through answered {} instead of a redirect", status),
                            });
                        }
                    }
                }
                PageClassification::TerminalPage => {
                    return Ok(self.complete(session, state));
                }
                PageClassification::Unrecognized => {
                    state.schema.clear();
                    return Err(BridgeError::UnrecognizedPage(url));
                }
            }
        }
    }

    fn hop(&self, state: &mut NavigationState, location: Url, hops: &mut u32) -> BridgeResult<()> {
        *hops += 1;
        if *hops > self.config.max_hops {
            return Err(BridgeError::RedirectLimit {
                url: location,
                hops: *hops - 1,
            });
        }
        tracing::debug!(from = %state.cursor_url, to = %location, "Following redirect");
        state.cursor_url = location;
        Ok(())
    }

    /// Finish the session: no request is made for it after this point.
    fn complete(&self, session: &ParticipantSession, state: &mut NavigationState) -> NavigationOutcome {
        state.schema.clear();
        session.close();
        tracing::info!(
            participant = %session.participant_code(),
            url = %state.cursor_url,
            phases = state.phase_counter,
            "Participant reached the end of the experiment"
        );
        session.events().game_over();
        NavigationOutcome::Completed
    }
}

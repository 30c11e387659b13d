// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Experiment bridge
//!
//! Lets automated agents take part in a multi-page web experiment over a
//! WebSocket. For every joined participant the bridge drives a private HTTP
//! session against the experiment application: it follows redirects, waits
//! out synchronization pages, discovers the form fields of each decision page
//! and submits the values the agent sends back. Progress is reported to the
//! agent as JSON events.

pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod navigator;
pub mod page;
pub mod registry;
pub mod schema;
pub mod server;
pub mod session;
pub mod state;
pub mod submit;
pub mod transport;
pub mod upstream;

pub use config::{BridgeConfig, NavigationConfig, PageMarkers, RejoinPolicy};
pub use error::{BridgeError, BridgeResult};
pub use events::{EventPublisher, EventSink};
pub use navigator::{NavigationOutcome, Navigator};
pub use page::{PageClassification, PageInterpreter};
pub use registry::SessionRegistry;
pub use server::Server;
pub use session::{NavigationState, ParticipantSession};
pub use state::AppState;

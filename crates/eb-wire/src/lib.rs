// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Experiment bridge wire contract
//!
//! Agents talk to the bridge with one JSON object per WebSocket text frame.
//! This crate defines both directions of that conversation so the bridge and
//! Rust agent runners agree on field names and on the event vocabulary.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! REST client for the experiment application's session API
//!
//! Creates sessions and turns their participant lists into the roster that
//! agent runners feed into the bridge as join messages.

pub mod client;
pub mod error;
pub mod types;

pub use client::*;
pub use error::*;
pub use types::*;

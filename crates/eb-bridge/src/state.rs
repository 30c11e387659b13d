// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Shared bridge state

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::navigator::Navigator;
use crate::registry::SessionRegistry;
use crate::submit::ActionSubmitter;

/// State shared by every connection
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub registry: SessionRegistry,
    pub navigator: Arc<Navigator>,
    pub submitter: Arc<ActionSubmitter>,
    /// One permit per open agent connection
    pub permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: SessionRegistry::new(),
            navigator: Arc::new(Navigator::from_config(&config)),
            submitter: Arc::new(ActionSubmitter::new(&config.navigation)),
            permits: Arc::new(Semaphore::new(config.connection_limit)),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

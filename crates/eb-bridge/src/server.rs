// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bridge server

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::state::AppState;
use crate::transport;

/// WebSocket bridge bound to its listening socket
pub struct Server {
    state: AppState,
    listener: TcpListener,
    app: Router,
}

impl Server {
    /// Validate `config` and bind its address.
    pub async fn bind(config: BridgeConfig) -> BridgeResult<Self> {
        Self::with_state(AppState::new(config)?).await
    }

    /// Bind using an already-built state.
    pub async fn with_state(state: AppState) -> BridgeResult<Self> {
        let listener = TcpListener::bind(state.config.bind_addr).await?;
        let app = transport::router(state.clone());
        Ok(Self {
            state,
            listener,
            app,
        })
    }

    pub fn local_addr(&self) -> BridgeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> BridgeResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves; open sockets are drained first.
    pub async fn run_until<F>(self, shutdown: F) -> BridgeResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!(
            %addr,
            experiment_url = %self.state.config.experiment_url,
            "Experiment bridge listening"
        );
        axum::serve(self.listener, self.app).with_graceful_shutdown(shutdown).await?;
        tracing::info!("Experiment bridge stopped");
        Ok(())
    }
}

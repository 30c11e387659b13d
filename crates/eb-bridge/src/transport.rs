// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! WebSocket transport
//!
//! Each upgraded socket gets a writer task that drains the connection's
//! outbound queue, while the handler loop reads frames and feeds them to the
//! [`Connection`]. Upgrades beyond the connection limit are answered with 429.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::OwnedSemaphorePermit;
use tower_http::trace::TraceLayer;

use crate::events::EventSink;
use crate::lifecycle::Connection;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(connect))
        .route("/ws", get(connect))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.len().await,
    }))
}

async fn connect(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let permit = match state.permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(
                limit = state.config.connection_limit,
                "Connection limit reached, refusing agent"
            );
            return (StatusCode::TOO_MANY_REQUESTS, "connection limit reached").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, permit))
}

async fn handle_socket(socket: WebSocket, state: AppState, _permit: OwnedSemaphorePermit) {
    let connection_id = eb_logging::connection_id();
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut outbound) = EventSink::channel(&connection_id);

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(connection = %writer_id, error = %err, "Cannot encode outbound message");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(state, sink);
    tracing::info!(connection = %connection_id, "Agent connected");

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => connection.handle_text(&text).await,
            Ok(WsMessage::Binary(_)) => connection.reject_binary(),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(connection = %connection_id, error = %err, "Socket error");
                break;
            }
        }
    }

    connection.close().await;
    writer.abort();
    tracing::info!(connection = %connection_id, "Agent disconnected");
}

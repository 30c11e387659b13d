// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use eb_session_client::{CreateSessionRequest, SessionClient, SessionClientError};
use eb_wire::Participant;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn create_session(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if headers.get("otree-rest-key").and_then(|v| v.to_str().ok()) != Some("s3cr3t") {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "bad key"}))).into_response();
    }
    assert_eq!(body["session_config_name"], "public_goods_simple");
    assert_eq!(body["num_participants"], 2);
    Json(json!({"code": "k2x9", "admin_url": "http://localhost/SessionStartLinks/k2x9"}))
        .into_response()
}

async fn get_session(Path(code): Path<String>) -> impl IntoResponse {
    if code != "k2x9" {
        return (StatusCode::NOT_FOUND, "no such session").into_response();
    }
    Json(json!({
        "code": "k2x9",
        "participants": [
            {"code": "p2bb", "id_in_session": 2},
            {"code": "p1aa", "id_in_session": 1, "label": "alice"}
        ]
    }))
    .into_response()
}

async fn spawn_session_api() -> (String, JoinHandle<()>) {
    let app = Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/get_session/:code", post(get_session));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn creates_session_and_reads_roster() {
    let (base, handle) = spawn_session_api().await;
    let client = SessionClient::from_url(&base, Some("s3cr3t")).unwrap();

    let roster = client
        .create_session_with_roster(&CreateSessionRequest::new("public_goods_simple", 2))
        .await
        .expect("roster");

    assert_eq!(roster.session_code, "k2x9");
    assert_eq!(
        roster.participants,
        vec![Participant::new("p1aa", 1), Participant::new("p2bb", 2)]
    );

    handle.abort();
}

#[tokio::test]
async fn missing_rest_key_surfaces_status() {
    let (base, handle) = spawn_session_api().await;
    let client = SessionClient::from_url(&base, None).unwrap();

    let err = client
        .create_session(&CreateSessionRequest::new("public_goods_simple", 2))
        .await
        .unwrap_err();
    match err {
        SessionClientError::Status { status, .. } => assert_eq!(status, StatusCode::FORBIDDEN),
        other => panic!("expected status error, got {other:?}"),
    }

    handle.abort();
}

#[tokio::test]
async fn unknown_session_is_an_error() {
    let (base, handle) = spawn_session_api().await;
    let client = SessionClient::from_url(&base, Some("s3cr3t")).unwrap();

    let err = client.get_session("nope").await.unwrap_err();
    assert!(matches!(err, SessionClientError::Status { status, .. } if status == StatusCode::NOT_FOUND));

    handle.abort();
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#![allow(dead_code)]

//! Shared fixtures: a scripted fake experiment application and helpers for
//! running the bridge against it.

use axum::{
    Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header::LOCATION},
    response::{Html, IntoResponse, Response},
};
use eb_bridge::{
    BridgeConfig, EventPublisher, EventSink, NavigationConfig, ParticipantSession, Server,
    state::AppState,
};
use eb_wire::{OutboundMessage, Participant};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use url::Url;

pub const WAIT_HEADER: &str = "oTree-Wait-Page";
pub const TERMINAL_PATH: &str = "/OutOfRangeNotification/";

/// One scripted answer of the fake application.
#[derive(Debug, Clone)]
pub enum Reply {
    Redirect(String),
    Wait,
    Html(String),
    Status(u16),
    /// Answer with the inner reply after a delay
    Slow(Duration, Box<Reply>),
}

impl Reply {
    pub fn redirect(path: &str) -> Self {
        Reply::Redirect(path.to_string())
    }

    pub fn html(body: impl Into<String>) -> Self {
        Reply::Html(body.into())
    }

    pub fn slow(delay_ms: u64, reply: Reply) -> Self {
        Reply::Slow(Duration::from_millis(delay_ms), Box::new(reply))
    }

    fn delay(&self) -> Option<Duration> {
        match self {
            Reply::Slow(delay, _) => Some(*delay),
            _ => None,
        }
    }

    fn into_response(self) -> Response {
        match self {
            Reply::Slow(_, reply) => (*reply).into_response(),
            Reply::Redirect(location) => {
                let mut response = StatusCode::FOUND.into_response();
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(LOCATION, value);
                }
                response
            }
            Reply::Wait => {
                let mut response = Html("<p>Please wait</p>").into_response();
                let name = HeaderName::from_bytes(WAIT_HEADER.as_bytes()).unwrap();
                response.headers_mut().insert(name, HeaderValue::from_static("true"));
                response
            }
            Reply::Html(body) => Html(body).into_response(),
            Reply::Status(code) => StatusCode::from_u16(code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
        }
    }
}

/// A request seen by the fake application.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub method: Method,
    pub path: String,
    pub body: String,
}

#[derive(Default)]
struct Script {
    routes: HashMap<(Method, String), VecDeque<Reply>>,
    hits: Vec<Hit>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a request as in flight until dropped.
struct InFlight<'a>(&'a Shared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fake experiment application.
///
/// Every `(method, path)` has a queue of replies; the last reply of a queue
/// keeps being served. Unscripted requests get 404.
#[derive(Clone)]
pub struct FakeExperiment {
    pub url: Url,
    shared: Arc<Shared>,
}

impl FakeExperiment {
    pub async fn start() -> Self {
        let shared = Arc::new(Shared::default());
        let app = Router::new().fallback(serve).with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake");
        });

        Self {
            url: Url::parse(&format!("http://{}", addr)).unwrap(),
            shared,
        }
    }

    pub fn on(&self, method: Method, path: &str, replies: impl IntoIterator<Item = Reply>) {
        let mut script = self.shared.script.lock().unwrap();
        script
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .extend(replies);
    }

    pub fn on_get(&self, path: &str, reply: Reply) {
        self.on(Method::GET, path, [reply]);
    }

    pub fn on_post(&self, path: &str, reply: Reply) {
        self.on(Method::POST, path, [reply]);
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.shared.script.lock().unwrap().hits.clone()
    }

    /// Most requests the application was serving at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.hits()
            .iter()
            .filter(|hit| hit.method == method && hit.path == path)
            .count()
    }

    pub fn posted(&self, path: &str) -> Vec<String> {
        self.hits()
            .into_iter()
            .filter(|hit| hit.method == Method::POST && hit.path == path)
            .map(|hit| hit.body)
            .collect()
    }

    pub fn url_for(&self, path: &str) -> Url {
        self.url.join(path).unwrap()
    }
}

async fn serve(
    State(shared): State<Arc<Shared>>,
    method: Method,
    uri: Uri,
    body: String,
) -> Response {
    let _in_flight = InFlight::enter(&shared);
    let path = uri.path().to_string();
    let reply = {
        let mut script = shared.script.lock().unwrap();
        script.hits.push(Hit {
            method: method.clone(),
            path: path.clone(),
            body,
        });
        match script.routes.get_mut(&(method, path)) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };
    if let Some(delay) = reply.as_ref().and_then(Reply::delay) {
        tokio::time::sleep(delay).await;
    }
    match reply {
        Some(reply) => reply.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Page with a state block and one wrapped input per field.
pub fn action_page(state: &Value, fields: &[&str]) -> String {
    let inputs: String = fields
        .iter()
        .map(|field| {
            format!(
                r#"<div class="_formfield"><label for="id_{field}">{field}</label><input type="number" name="{field}" id="id_{field}"></div>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><script id="otree-data" type="application/json">{state}</script><form method="post">{inputs}<button class="otree-btn-next">Next</button></form></body></html>"#
    )
}

/// Page with a state block and nothing to fill in.
pub fn info_page(state: &Value) -> String {
    format!(
        r#"<html><body><script id="otree-data" type="application/json">{state}</script><form method="post"><button class="otree-btn-next">Next</button></form></body></html>"#
    )
}

pub fn join_path(code: &str) -> String {
    format!("/InitializeParticipant/{}", code)
}

/// Bridge configuration with short delays, pointed at `experiment`.
pub fn bridge_config(experiment: &FakeExperiment) -> BridgeConfig {
    BridgeConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        experiment_url: experiment.url.clone(),
        navigation: NavigationConfig {
            request_timeout_ms: 5_000,
            poll_timeout_ms: 5_000,
            barrier_poll_interval_ms: 20,
            max_barrier_polls: 5,
            ..NavigationConfig::default()
        },
        ..BridgeConfig::default()
    }
}

/// Session for `participant` with its events captured in a channel.
pub fn session(
    config: &BridgeConfig,
    participant: Participant,
) -> (Arc<ParticipantSession>, UnboundedReceiver<OutboundMessage>) {
    let (sink, rx) = EventSink::channel("conn-test");
    let events = EventPublisher::new(participant.clone(), sink);
    let session = ParticipantSession::start(config, participant, events).expect("session");
    (Arc::new(session), rx)
}

pub fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Running bridge server.
pub struct Bridge {
    pub addr: SocketAddr,
    pub state: AppState,
    task: JoinHandle<()>,
}

impl Bridge {
    pub async fn start(config: BridgeConfig) -> Self {
        let server = Server::bind(config).await.expect("bind bridge");
        let addr = server.local_addr().unwrap();
        let state = server.state().clone();
        let task = tokio::spawn(async move {
            server.run().await.expect("bridge");
        });
        Self { addr, state, task }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self) -> Agent {
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url()).await.expect("connect");
        Agent { ws }
    }

    /// Wait until the registry holds `expected` sessions.
    pub async fn wait_for_sessions(&self, expected: usize) {
        let registry = self.state.registry.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry size in time");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Test-side WebSocket agent.
pub struct Agent {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Agent {
    pub async fn send(&mut self, message: Value) {
        self.ws.send(Message::Text(message.to_string())).await.expect("send");
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.ws.send(message).await.expect("send");
    }

    /// Next JSON text frame.
    pub async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("frame in time")
                .expect("socket open")
                .expect("valid frame");
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).expect("JSON frame");
            }
        }
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(window, self.ws.next()).await {
            panic!("unexpected frame: {text}");
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

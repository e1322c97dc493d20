//! In-process fake of the analysis backend.
//!
//! Serves the REST endpoints and `/ws/agent-logs` on `127.0.0.1:0` with
//! canned replies, and records what the client sent.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Form, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use thirdchair_client::config::ClientConfig;
use thirdchair_client::retry::BackoffConfig;
use thirdchair_client::workflow::{AnalysisWorkflow, WorkflowSpec};
use thirdchair_core::staging::{StagedFile, StagingBuffer};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Behaviour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// One frame the fake sends on the progress stream.
#[derive(Debug, Clone)]
pub enum Frame {
    /// JSON event tagged with the job id from the connect URL.
    Own(Value),
    /// JSON event sent as-is.
    Untagged(Value),
    /// JSON event tagged with some other job id.
    Foreign(Value),
    /// Arbitrary text.
    Raw(&'static str),
}

#[derive(Debug, Clone)]
pub struct Behavior {
    pub analyze: Reply,
    pub analyze_delay: Duration,
    pub process: Reply,
    /// Number of `503` replies from the process endpoint before `process`.
    pub process_failures: usize,
    pub login: Reply,
    pub chat: Reply,
    pub upload: Reply,
    /// Sent right after the stream opens. When non-empty the analyze
    /// endpoint waits for them before replying.
    pub frames: Vec<Frame>,
    /// Sent shortly after the process endpoint has replied.
    pub late_frames: Vec<Frame>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            analyze: Reply::ok(json!({})),
            analyze_delay: Duration::ZERO,
            process: Reply::ok(json!({ "success": true, "processed_report": {} })),
            process_failures: 0,
            login: Reply::ok(json!({ "access_token": "test-token", "token_type": "bearer" })),
            chat: Reply::ok(json!({ "response": "ok" })),
            upload: Reply::ok(json!({ "message": "Files uploaded successfully" })),
            frames: Vec::new(),
            late_frames: Vec::new(),
        }
    }
}

/// A file part received by a multipart endpoint.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub len: usize,
}

#[derive(Default)]
pub struct Recorded {
    pub analyze_files: Vec<ReceivedFile>,
    pub upload_files: Vec<ReceivedFile>,
    pub report_data: Option<Value>,
    pub stream_job_ids: Vec<String>,
    pub login_form: Option<HashMap<String, String>>,
    pub chat_query: Option<String>,
    pub authorization: Option<String>,
}

pub struct BackendState {
    behavior: Behavior,
    pub analyze_calls: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub recorded: Mutex<Recorded>,
    frames_sent: Notify,
    processed: Notify,
}

impl BackendState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> usize {
        [
            &self.analyze_calls,
            &self.process_calls,
            &self.login_calls,
            &self.chat_calls,
            &self.upload_calls,
        ]
        .iter()
        .map(|c| Self::count(c))
        .sum()
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct TestBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl TestBackend {
    pub async fn spawn(behavior: Behavior) -> Self {
        let state = Arc::new(BackendState {
            behavior,
            analyze_calls: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            recorded: Mutex::new(Recorded::default()),
            frames_sent: Notify::new(),
            processed: Notify::new(),
        });

        let app = Router::new()
            .route("/login", post(login))
            .route("/upload-multiple", post(upload))
            .route("/chat", post(chat))
            .route("/analyze-consistency", post(analyze))
            .route("/analyze-firm-standards", post(analyze))
            .route("/process-coherence-report", post(process))
            .route("/process-style-report", post(process))
            .route("/ws/agent-logs", get(agent_logs))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(format!("http://{}", self.addr), format!("ws://{}", self.addr))
    }

    pub fn workflow(&self, spec: WorkflowSpec) -> AnalysisWorkflow {
        AnalysisWorkflow::from_config(&self.config(), spec)
            .unwrap()
            .with_backoff(fast_backoff())
    }
}

pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        max_attempts: 3,
    }
}

pub fn staged(names: &[&str]) -> StagingBuffer {
    let mut buffer = StagingBuffer::new();
    buffer.add(
        names
            .iter()
            .map(|name| {
                StagedFile::new(*name, format!("contents of {name}").into_bytes()).unwrap()
            }),
    );
    buffer
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn read_files(multipart: &mut Multipart) -> Vec<ReceivedFile> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let len = field.bytes().await.unwrap().len();
        files.push(ReceivedFile {
            field: field_name,
            file_name,
            content_type,
            len,
        });
    }
    files
}

async fn analyze(State(state): State<Arc<BackendState>>, mut multipart: Multipart) -> Response {
    state.analyze_calls.fetch_add(1, Ordering::SeqCst);
    let files = read_files(&mut multipart).await;
    state.recorded().analyze_files = files;

    if !state.behavior.frames.is_empty() {
        let _ = tokio::time::timeout(Duration::from_secs(5), state.frames_sent.notified()).await;
        // Give the client a moment to apply what it received.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(state.behavior.analyze_delay).await;

    state.behavior.analyze.clone().into_response()
}

async fn process(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let call = state.process_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.recorded().report_data = body.get("report_data").cloned();

    if call <= state.behavior.process_failures {
        return Reply::status(503, json!({ "detail": "Service Unavailable" })).into_response();
    }

    state.processed.notify_one();
    state.behavior.process.clone().into_response()
}

async fn login(
    State(state): State<Arc<BackendState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    state.recorded().login_form = Some(form);
    state.behavior.login.clone().into_response()
}

async fn chat(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    {
        let mut recorded = state.recorded();
        recorded.chat_query = query.get("query").cloned();
        recorded.authorization = authorization(&headers);
    }
    state.behavior.chat.clone().into_response()
}

async fn upload(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.upload_calls.fetch_add(1, Ordering::SeqCst);
    let files = read_files(&mut multipart).await;
    {
        let mut recorded = state.recorded();
        recorded.upload_files = files;
        recorded.authorization = authorization(&headers);
    }
    state.behavior.upload.clone().into_response()
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn agent_logs(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let job_id = query.get("job_id").cloned().unwrap_or_default();
    state.recorded().stream_job_ids.push(job_id.clone());
    ws.on_upgrade(move |socket| stream_frames(socket, job_id, state))
}

async fn stream_frames(mut socket: WebSocket, job_id: String, state: Arc<BackendState>) {
    for frame in &state.behavior.frames {
        if send_frame(&mut socket, frame, &job_id).await.is_err() {
            return;
        }
    }
    if !state.behavior.frames.is_empty() {
        state.frames_sent.notify_one();
    }

    if !state.behavior.late_frames.is_empty() {
        let _ = tokio::time::timeout(Duration::from_secs(5), state.processed.notified()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        for frame in &state.behavior.late_frames {
            if send_frame(&mut socket, frame, &job_id).await.is_err() {
                return;
            }
        }
    }

    // Hold the connection open until the client goes away.
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

async fn send_frame(
    socket: &mut WebSocket,
    frame: &Frame,
    job_id: &str,
) -> Result<(), axum::Error> {
    let text = match frame {
        Frame::Own(value) => tag(value, job_id),
        Frame::Untagged(value) => value.to_string(),
        Frame::Foreign(value) => tag(value, "00000000-0000-4000-8000-000000000000"),
        Frame::Raw(text) => text.to_string(),
    };
    socket.send(Message::Text(text.into())).await
}

fn tag(value: &Value, job_id: &str) -> String {
    let mut value = value.clone();
    if let Some(map) = value.as_object_mut() {
        map.insert("job_id".into(), Value::String(job_id.to_string()));
    }
    value.to_string()
}

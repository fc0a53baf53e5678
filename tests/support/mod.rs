#![allow(dead_code)]

//! In-process WAHA gateway for integration tests.
//!
//! Serves the subset of the REST API the panel uses, backed by an in-memory
//! session table. Every request is counted by `"METHOD /path"` and requires
//! `X-Api-Key: test-key`; setting `revoked` makes every call answer 401.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Request, State},
    http::{header, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use waha_panel::config::GatewaySettings;
use waha_panel::{Credentials, ExpiryHook, GatewayClient};

pub const API_KEY: &str = "test-key";

/// Bytes served by the QR endpoint.
pub const QR_PNG: &[u8] = b"\x89PNG\r\n\x1a\nmock-qr";

/// One multipart request as the gateway saw it.
#[derive(Debug, Default, Clone)]
pub struct Upload {
    pub endpoint: String,
    pub fields: HashMap<String, String>,
    pub file_field: Option<String>,
    pub file_name: Option<String>,
    pub file_len: usize,
}

#[derive(Default)]
pub struct MockState {
    /// Session name → status string.
    pub sessions: HashMap<String, String>,
    /// Body of `/me` and of the session's `me` field when WORKING.
    pub me: Option<Value>,
    pub profile: Value,
    pub hits: HashMap<String, usize>,
    /// Every call answers 401.
    pub revoked: bool,
    pub qr_fails: bool,
    pub me_fails: bool,
    /// Replaces the `GET /api/sessions` response.
    pub list_override: Option<(StatusCode, String)>,
    /// Replaces lifecycle action responses.
    pub action_error: Option<(StatusCode, String)>,
    /// Applied to `GET /api/sessions/{name}`.
    pub session_delay: Duration,
    /// Session status is reported as JSON `null`.
    pub null_status: bool,
    /// Applied to lifecycle actions.
    pub action_delay: Duration,
    pub uploads: Vec<Upload>,
    /// JSON bodies of send calls, by endpoint.
    pub sent: Vec<(String, Value)>,
}

pub type Shared = Arc<Mutex<MockState>>;

pub struct MockGateway {
    pub url: String,
    pub state: Shared,
    handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            profile: json!({
                "id": "5511999999999@c.us",
                "name": "Ops Desk",
                "status": "Available",
                "picture": null,
            }),
            ..MockState::default()
        }));

        let app = Router::new()
            .route("/api/sessions", get(list_sessions).post(create_session))
            .route("/api/sessions/{name}", get(get_session))
            .route("/api/sessions/{name}/me", get(get_me))
            .route("/api/sessions/{name}/start", post(lifecycle))
            .route("/api/sessions/{name}/stop", post(lifecycle))
            .route("/api/sessions/{name}/logout", post(lifecycle))
            .route("/api/sessions/{name}/restart", post(lifecycle))
            .route("/api/default/auth/qr", get(get_qr))
            .route("/api/default/profile", get(get_profile))
            .route("/api/default/profile/name", put(set_profile_name))
            .route("/api/default/profile/status", put(set_profile_status))
            .route(
                "/api/default/profile/picture",
                put(upload).delete(delete_profile_picture),
            )
            .route("/api/sendText", post(send_json))
            .route("/api/sendButtons", post(send_json))
            .route("/api/sendImage", post(upload))
            .route("/api/sendFile", post(upload))
            .route("/api/sendVoice", post(upload))
            .route("/api/sendVideo", post(upload))
            .layer(middleware::from_fn_with_state(state.clone(), require_key))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_status(&self, name: &str, status: &str) {
        self.lock().sessions.insert(name.to_string(), status.to_string());
    }

    pub fn hits(&self, key: &str) -> usize {
        self.lock().hits.get(key).copied().unwrap_or(0)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.url.clone(), API_KEY)
    }

    /// A client with the valid key and the given expiry hook.
    pub fn client(&self, hook: ExpiryHook) -> GatewayClient {
        GatewayClient::new(&self.credentials(), &GatewaySettings::default(), hook).unwrap()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

async fn require_key(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    {
        let mut s = state.lock().unwrap();
        let key = format!("{} {}", request.method(), request.uri().path());
        *s.hits.entry(key).or_default() += 1;
        if s.revoked || provided.as_deref() != Some(API_KEY) {
            return message(StatusCode::UNAUTHORIZED, "Unauthorized");
        }
    }
    next.run(request).await
}

async fn list_sessions(State(state): State<Shared>) -> Response {
    let s = state.lock().unwrap();
    if let Some((status, body)) = &s.list_override {
        return (*status, body.clone()).into_response();
    }
    let list: Vec<Value> = s
        .sessions
        .iter()
        .map(|(name, status)| json!({ "name": name, "status": status }))
        .collect();
    Json(Value::Array(list)).into_response()
}

async fn create_session(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let delay = state.lock().unwrap().action_delay;
    tokio::time::sleep(delay).await;

    let mut s = state.lock().unwrap();
    if let Some((status, body)) = &s.action_error {
        return (*status, body.clone()).into_response();
    }
    let name = body["name"].as_str().unwrap_or("default").to_string();
    if s.sessions.contains_key(&name) {
        return message(StatusCode::UNPROCESSABLE_ENTITY, "Session already exists");
    }
    s.sessions.insert(name.clone(), "STOPPED".into());
    (StatusCode::CREATED, Json(json!({ "name": name, "status": "STOPPED" }))).into_response()
}

async fn get_session(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let delay = state.lock().unwrap().session_delay;
    tokio::time::sleep(delay).await;

    let s = state.lock().unwrap();
    match s.sessions.get(&name) {
        Some(status) => {
            let me = if status == "WORKING" { s.me.clone() } else { None };
            let status = if s.null_status { Value::Null } else { json!(status) };
            Json(json!({ "name": name, "status": status, "me": me })).into_response()
        }
        None => message(StatusCode::NOT_FOUND, "Session not found"),
    }
}

async fn get_me(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    let s = state.lock().unwrap();
    if s.me_fails {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "me unavailable");
    }
    let me = match s.sessions.get(&name) {
        Some(status) if status == "WORKING" => s.me.clone().unwrap_or(Value::Null),
        _ => Value::Null,
    };
    Json(me).into_response()
}

async fn lifecycle(State(state): State<Shared>, Path(name): Path<String>, uri: Uri) -> Response {
    let delay = state.lock().unwrap().action_delay;
    tokio::time::sleep(delay).await;

    let mut s = state.lock().unwrap();
    if let Some((status, body)) = &s.action_error {
        return (*status, body.clone()).into_response();
    }
    let Some(current) = s.sessions.get_mut(&name) else {
        return message(StatusCode::NOT_FOUND, "Session not found");
    };
    let next = match uri.path().rsplit('/').next().unwrap_or_default() {
        "start" => "SCAN_QR_CODE",
        "restart" => "STARTING",
        _ => "STOPPED",
    };
    *current = next.to_string();
    Json(json!({ "name": name, "status": next })).into_response()
}

async fn get_qr(State(state): State<Shared>) -> Response {
    if state.lock().unwrap().qr_fails {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "QR unavailable");
    }
    ([(header::CONTENT_TYPE, "image/png")], QR_PNG).into_response()
}

async fn get_profile(State(state): State<Shared>) -> Json<Value> {
    Json(state.lock().unwrap().profile.clone())
}

async fn set_profile_name(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().unwrap().profile["name"] = body["name"].clone();
    Json(json!({ "success": true }))
}

async fn set_profile_status(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().unwrap().profile["status"] = body["status"].clone();
    Json(json!({ "success": true }))
}

async fn delete_profile_picture(State(state): State<Shared>) -> Json<Value> {
    state.lock().unwrap().profile["picture"] = Value::Null;
    Json(json!({ "success": true }))
}

async fn send_json(State(state): State<Shared>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    let endpoint = uri.path().trim_start_matches("/api/").to_string();
    state.lock().unwrap().sent.push((endpoint, body));
    Json(json!({ "id": "true_5511999999999@c.us_MOCK" }))
}

async fn upload(State(state): State<Shared>, uri: Uri, mut multipart: Multipart) -> Response {
    let mut upload = Upload {
        endpoint: uri.path().trim_start_matches("/api/").to_string(),
        ..Upload::default()
    };
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.unwrap_or_default();
                upload.file_field = Some(name);
                upload.file_name = Some(file_name);
                upload.file_len = bytes.len();
            }
            None => {
                let text = field.text().await.unwrap_or_default();
                upload.fields.insert(name, text);
            }
        }
    }

    let mut s = state.lock().unwrap();
    if upload.endpoint.ends_with("profile/picture") {
        s.profile["picture"] = json!("https://pps.example.com/new.jpg");
    }
    s.uploads.push(upload);
    Json(json!({ "success": true })).into_response()
}

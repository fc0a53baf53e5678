//! HTTP client for the WAHA gateway REST API.
//!
//! [`GatewayClient`] wraps `reqwest::Client` and provides one method per
//! gateway endpoint. Each method only shapes the request (path, method, body
//! encoding); responses come back as `serde_json::Value` except where the
//! poller needs a typed view ([`SessionInfo`], [`MeInfo`], QR bytes).
//!
//! ## Authentication
//!
//! Every call sends `X-Api-Key: <key>`. A 401 from any call fires the
//! client's [`ExpiryHook`] and returns [`GatewayError::SessionExpired`], so
//! session expiry is handled in exactly one place.
//!
//! ## Login probe
//!
//! [`probe`] is independent of any stored credentials: it builds its own
//! short-lived client with a bounded timeout and checks that `/api/sessions`
//! answers 200 with a JSON array.
//!
//! ## Error handling
//!
//! Non-2xx responses are parsed for a `message` (or `error`) field in the
//! JSON body. If parsing fails, the status line and raw body are used.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::GatewaySettings;
use crate::credentials::Credentials;
use crate::error::{GatewayError, ProbeError};
use crate::expiry::ExpiryHook;
use crate::message::{Attachment, Button, MediaKind, MessageContent, MessagePayload};
use crate::presentation::{SessionAction, SessionStatus};
use crate::util::normalize_host;

/// Header carrying the API key on every call.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Name of the implicit session every gateway has.
pub const DEFAULT_SESSION: &str = "default";

/// Longest raw error body echoed back to the operator.
const MAX_ERROR_BODY: usize = 200;

/// Session as reported by `GET /api/sessions/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub name: String,
    /// Raw status string; see [`SessionInfo::status`]. `null` and
    /// non-string values read as empty.
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, alias = "user")]
    pub me: Option<MeInfo>,
}

impl SessionInfo {
    pub fn status(&self) -> SessionStatus {
        SessionStatus::parse(&self.status)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Identity of the paired WhatsApp account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub wid: Option<String>,
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
}

impl MeInfo {
    /// `id`, falling back to `wid`. Empty strings count as absent.
    pub fn display_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.wid.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Result of a successful [`probe`].
#[derive(Debug, Clone)]
pub struct ProbeSuccess {
    /// Normalised host (no trailing slash) and trimmed key.
    pub credentials: Credentials,
    /// Raw session list returned by the gateway.
    pub sessions: Vec<Value>,
}

/// HTTP client bound to one gateway host and API key.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: Url,
    host: String,
    on_expired: ExpiryHook,
}

impl GatewayClient {
    /// Build a client for `credentials`. Every request carries the API key.
    pub fn new(
        credentials: &Credentials,
        settings: &GatewaySettings,
        on_expired: ExpiryHook,
    ) -> Result<Self, GatewayError> {
        let host = normalize_host(&credentials.host);
        let base_url = Url::parse(&host)
            .map_err(|e| GatewayError::RemoteCallFailed(format!("invalid host {host}: {e}")))?;

        let mut default_headers = HeaderMap::new();
        let key = HeaderValue::from_str(&credentials.api_key).map_err(|_| {
            GatewayError::RemoteCallFailed("API key contains invalid characters".into())
        })?;
        default_headers.insert(HeaderName::from_static(API_KEY_HEADER), key);
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| GatewayError::RemoteCallFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            host,
            on_expired,
        })
    }

    /// The gateway host (without trailing slash).
    pub fn host(&self) -> &str {
        &self.host
    }

    // --- Sessions ---

    /// `GET /api/sessions`: list all sessions.
    pub async fn list_sessions(&self) -> Result<Value, GatewayError> {
        let url = self.url(&["api", "sessions"])?;
        self.json(self.http.get(url)).await
    }

    /// `GET /api/sessions/{name}`: status snapshot.
    pub async fn get_session(&self, name: &str) -> Result<SessionInfo, GatewayError> {
        let url = self.url(&["api", "sessions", name])?;
        let value = self.json(self.http.get(url)).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::RemoteCallFailed(format!("invalid session payload: {e}")))
    }

    /// `GET /api/sessions/{name}/me`: paired account, `None` when not paired.
    pub async fn get_me(&self, name: &str) -> Result<Option<MeInfo>, GatewayError> {
        let url = self.url(&["api", "sessions", name, "me"])?;
        let value = self.json(self.http.get(url)).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| GatewayError::RemoteCallFailed(format!("invalid identity payload: {e}")))
    }

    /// `POST /api/sessions`: create a session.
    pub async fn create_session(&self, name: &str) -> Result<Value, GatewayError> {
        let url = self.url(&["api", "sessions"])?;
        self.json(self.http.post(url).json(&json!({ "name": name })))
            .await
    }

    /// `POST /api/sessions/{name}/start`
    pub async fn start_session(&self, name: &str) -> Result<Value, GatewayError> {
        self.lifecycle(name, "start").await
    }

    /// `POST /api/sessions/{name}/stop`
    pub async fn stop_session(&self, name: &str) -> Result<Value, GatewayError> {
        self.lifecycle(name, "stop").await
    }

    /// `POST /api/sessions/{name}/logout`
    pub async fn logout_session(&self, name: &str) -> Result<Value, GatewayError> {
        self.lifecycle(name, "logout").await
    }

    /// `POST /api/sessions/{name}/restart`
    pub async fn restart_session(&self, name: &str) -> Result<Value, GatewayError> {
        self.lifecycle(name, "restart").await
    }

    /// Dispatch a [`SessionAction`] to its endpoint.
    pub async fn run_action(&self, name: &str, action: SessionAction) -> Result<Value, GatewayError> {
        match action {
            SessionAction::Create => self.create_session(name).await,
            SessionAction::Start => self.start_session(name).await,
            SessionAction::Stop => self.stop_session(name).await,
            SessionAction::Logout => self.logout_session(name).await,
            SessionAction::Restart => self.restart_session(name).await,
        }
    }

    async fn lifecycle(&self, name: &str, action: &str) -> Result<Value, GatewayError> {
        let url = self.url(&["api", "sessions", name, action])?;
        self.json(self.http.post(url)).await
    }

    /// `GET /api/default/auth/qr`: pairing QR image bytes (default session only).
    pub async fn get_qr(&self) -> Result<Vec<u8>, GatewayError> {
        let url = self.url(&["api", DEFAULT_SESSION, "auth", "qr"])?;
        let resp = self
            .execute(self.http.get(url).header(ACCEPT, "image/png"))
            .await?;
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if bytes.is_empty() {
            return Err(GatewayError::RemoteCallFailed("gateway returned an empty QR image".into()));
        }
        Ok(bytes.to_vec())
    }

    // --- Profile (default session) ---

    /// `GET /api/default/profile`
    pub async fn get_profile(&self) -> Result<Value, GatewayError> {
        let url = self.url(&["api", DEFAULT_SESSION, "profile"])?;
        self.json(self.http.get(url)).await
    }

    /// `PUT /api/default/profile/name`
    pub async fn set_profile_name(&self, name: &str) -> Result<Value, GatewayError> {
        let url = self.url(&["api", DEFAULT_SESSION, "profile", "name"])?;
        self.json(self.http.put(url).json(&json!({ "name": name })))
            .await
    }

    /// `PUT /api/default/profile/status`: the "about" text, not the session status.
    pub async fn set_profile_status(&self, status: &str) -> Result<Value, GatewayError> {
        let url = self.url(&["api", DEFAULT_SESSION, "profile", "status"])?;
        self.json(self.http.put(url).json(&json!({ "status": status })))
            .await
    }

    /// `PUT /api/default/profile/picture`: multipart upload, field `file`.
    pub async fn set_profile_picture(&self, picture: Attachment) -> Result<Value, GatewayError> {
        let url = self.url(&["api", DEFAULT_SESSION, "profile", "picture"])?;
        let form = Form::new().part("file", file_part(picture));
        self.json(self.http.put(url).multipart(form)).await
    }

    /// `DELETE /api/default/profile/picture`
    pub async fn delete_profile_picture(&self) -> Result<Value, GatewayError> {
        let url = self.url(&["api", DEFAULT_SESSION, "profile", "picture"])?;
        self.json(self.http.delete(url)).await
    }

    // --- Sending ---

    /// `POST /api/sendText`
    pub async fn send_text(&self, session: &str, chat_id: &str, text: &str) -> Result<Value, GatewayError> {
        let url = self.url(&["api", "sendText"])?;
        let body = json!({ "session": session, "chatId": chat_id, "text": text });
        self.json(self.http.post(url).json(&body)).await
    }

    /// `POST /api/sendImage|sendFile|sendVoice|sendVideo`: multipart
    /// with fields `session`, `chatId`, `file`.
    pub async fn send_media(
        &self,
        kind: MediaKind,
        session: &str,
        chat_id: &str,
        file: Attachment,
    ) -> Result<Value, GatewayError> {
        let url = self.url(&["api", kind.endpoint()])?;
        let form = Form::new()
            .text("session", session.to_string())
            .text("chatId", chat_id.to_string())
            .part("file", file_part(file));
        self.json(self.http.post(url).multipart(form)).await
    }

    /// `POST /api/sendButtons`
    pub async fn send_buttons(
        &self,
        session: &str,
        chat_id: &str,
        text: &str,
        buttons: &[Button],
    ) -> Result<Value, GatewayError> {
        let url = self.url(&["api", "sendButtons"])?;
        let body = json!({
            "session": session,
            "chatId": chat_id,
            "text": text,
            "buttons": buttons,
        });
        self.json(self.http.post(url).json(&body)).await
    }

    /// Send a validated payload through the matching endpoint.
    pub async fn send(&self, payload: MessagePayload) -> Result<Value, GatewayError> {
        let MessagePayload {
            chat_id,
            session,
            content,
        } = payload;
        match content {
            MessageContent::Text(text) => self.send_text(&session, &chat_id, &text).await,
            MessageContent::Media { kind, file } => {
                self.send_media(kind, &session, &chat_id, file).await
            }
            MessageContent::Buttons { text, buttons } => {
                self.send_buttons(&session, &chat_id, &text, &buttons)
                    .await
            }
        }
    }

    // --- Plumbing ---

    /// Base URL plus path-escaped segments.
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::RemoteCallFailed(format!("host {} cannot be a base URL", self.host)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, fire the expiry hook on 401, turn other failures into messages.
    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let request = req
            .build()
            .map_err(|e| GatewayError::RemoteCallFailed(format!("invalid request: {e}")))?;
        let method = request.method().clone();
        let path = request.url().path().to_string();
        debug!(%method, %path, "gateway request");

        let resp = self.http.execute(request).await.map_err(transport_error)?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!(%method, %path, "gateway answered 401, session expired");
            self.on_expired.fire();
            return Err(GatewayError::SessionExpired);
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            debug!(%method, %path, status = status.as_u16(), %message, "gateway call failed");
            return Err(GatewayError::RemoteCallFailed(message));
        }

        Ok(resp)
    }

    /// [`execute`](Self::execute) and decode the body as JSON.
    ///
    /// Empty bodies become `Value::Null`; non-JSON bodies are kept as a string.
    async fn json(&self, req: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        let resp = self.execute(req).await?;
        let body = resp.text().await.map_err(transport_error)?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

fn file_part(file: Attachment) -> Part {
    Part::bytes(file.bytes).file_name(file.file_name)
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::RemoteCallFailed(transport_message(&e))
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request to the gateway timed out".to_string()
    } else if e.is_connect() {
        format!("could not connect to the gateway: {e}")
    } else {
        format!("HTTP request failed: {e}")
    }
}

/// User-facing message for a non-2xx response.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error"]
            .iter()
            .find_map(|k| v.get(k).and_then(Value::as_str).map(String::from))
    });
    if let Some(message) = from_json.filter(|m| !m.is_empty()) {
        return message;
    }

    let reason = status.canonical_reason().unwrap_or("error");
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {} {}", status.as_u16(), reason)
    } else {
        let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("HTTP {} {}: {}", status.as_u16(), reason, snippet)
    }
}

/// Check a host/key pair against `GET /api/sessions` before adopting it.
pub async fn probe(host: &str, api_key: &str, timeout: Duration) -> Result<ProbeSuccess, ProbeError> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Err(ProbeError::InvalidHost);
    }
    let parsed = Url::parse(&host).map_err(|_| ProbeError::InvalidHost)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
        return Err(ProbeError::InvalidHost);
    }

    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ProbeError::EmptyApiKey);
    }

    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::NetworkError(e.to_string()))?;

    let resp = http
        .get(format!("{host}/api/sessions"))
        .header(API_KEY_HEADER, api_key)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| ProbeError::NetworkError(transport_message(&e)))?;

    match resp.status() {
        StatusCode::OK => {}
        StatusCode::UNAUTHORIZED => return Err(ProbeError::InvalidApiKey),
        StatusCode::NOT_FOUND => return Err(ProbeError::EndpointNotFound),
        other => return Err(ProbeError::HttpError(other.as_u16())),
    }

    let body = resp
        .text()
        .await
        .map_err(|e| ProbeError::NetworkError(transport_message(&e)))?;
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Array(sessions)) => {
            debug!(%host, sessions = sessions.len(), "probe succeeded");
            Ok(ProbeSuccess {
                credentials: Credentials::new(host, api_key),
                sessions,
            })
        }
        _ => Err(ProbeError::InvalidPayload),
    }
}

/// Session picker entries: `default` first, then every other listed name once.
///
/// List items may be session objects (`{"name": ...}`) or bare strings.
pub fn session_names(sessions: &Value) -> Vec<String> {
    let mut names = vec![DEFAULT_SESSION.to_string()];
    let Some(items) = sessions.as_array() else {
        return names;
    };
    for item in items {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| item.as_str());
        if let Some(name) = name {
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_message() {
        let msg = error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Session already exists","error":"Unprocessable"}"#,
        );
        assert_eq!(msg, "Session already exists");
    }

    #[test]
    fn error_message_falls_back_to_error_field() {
        let msg = error_message(StatusCode::BAD_REQUEST, r#"{"error":"bad chatId"}"#);
        assert_eq!(msg, "bad chatId");
    }

    #[test]
    fn error_message_uses_status_and_body() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "HTTP 502 Bad Gateway: upstream down"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "  "),
            "HTTP 500 Internal Server Error"
        );
    }

    #[test]
    fn session_info_accepts_user_alias() {
        let info: SessionInfo = serde_json::from_value(json!({
            "name": "default",
            "status": "WORKING",
            "user": { "id": "5511@c.us" }
        }))
        .unwrap();
        assert_eq!(info.status(), SessionStatus::Working);
        assert_eq!(info.me.unwrap().display_id(), Some("5511@c.us"));
    }

    #[test]
    fn session_info_tolerates_missing_fields() {
        let info: SessionInfo = serde_json::from_value(json!({ "status": "NEW_STATE" })).unwrap();
        assert!(info.name.is_empty());
        assert!(matches!(info.status(), SessionStatus::Unknown(_)));
        assert!(info.me.is_none());
    }

    #[test]
    fn session_info_reads_null_or_odd_status_as_unknown() {
        for status in [Value::Null, json!(42), json!({ "code": 1 })] {
            let info: SessionInfo =
                serde_json::from_value(json!({ "name": "default", "status": status })).unwrap();
            assert_eq!(info.status, "");
            assert!(matches!(info.status(), SessionStatus::Unknown(_)));
        }
    }

    #[test]
    fn me_display_id_skips_empty() {
        let me = MeInfo {
            id: Some(String::new()),
            wid: Some("99@c.us".into()),
            push_name: None,
        };
        assert_eq!(me.display_id(), Some("99@c.us"));
    }

    #[test]
    fn session_names_puts_default_first() {
        let list = json!([{ "name": "sales" }, { "name": "default" }, "support", { "name": "sales" }]);
        assert_eq!(session_names(&list), vec!["default", "sales", "support"]);
    }

    #[test]
    fn session_names_on_non_list() {
        assert_eq!(session_names(&json!({"oops": true})), vec!["default"]);
    }

    #[test]
    fn url_escapes_session_names() {
        let client = GatewayClient::new(
            &Credentials::new("https://gw.example.com/waha/", "k"),
            &GatewaySettings::default(),
            ExpiryHook::noop(),
        )
        .unwrap();
        let url = client.url(&["api", "sessions", "team a/b", "start"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://gw.example.com/waha/api/sessions/team%20a%2Fb/start"
        );
    }

    #[tokio::test]
    async fn probe_rejects_bad_hosts_before_any_request() {
        let timeout = Duration::from_millis(200);
        for host in ["", "   ", "not a url", "ftp://gw.example.com", "mailto:ops@example.com"] {
            assert_eq!(probe(host, "key", timeout).await.unwrap_err(), ProbeError::InvalidHost);
        }
    }

    #[tokio::test]
    async fn probe_rejects_empty_key() {
        let err = probe("http://127.0.0.1:9", "  ", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::EmptyApiKey);
    }
}

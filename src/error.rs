//! Error types.
//!
//! The login probe has its own taxonomy ([`ProbeError`]) so the login command
//! can tell the operator exactly what is wrong with the host or key. Every
//! other gateway call collapses into [`GatewayError`]: either the session
//! expired (HTTP 401, the expiry hook has already fired) or the call failed
//! with a short human-readable message.

use thiserror::Error;

/// Failure of the login connectivity probe.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// Host is empty, not a URL, or not `http`/`https`.
    #[error("invalid host: use a full URL starting with http:// or https://")]
    InvalidHost,

    #[error("API key must not be empty")]
    EmptyApiKey,

    /// The gateway answered 401.
    #[error("invalid API key: the gateway rejected the credentials")]
    InvalidApiKey,

    /// The gateway answered 404 on `/api/sessions`.
    #[error("endpoint /api/sessions not found: check the host points at a WAHA instance")]
    EndpointNotFound,

    /// Any other non-200 status.
    #[error("HTTP error {0} while connecting to the gateway")]
    HttpError(u16),

    /// No response received (DNS, refused connection, timeout).
    #[error("could not reach the host: {0}")]
    NetworkError(String),

    /// 200 whose body is not a JSON array.
    #[error("unexpected response format: is this really a WAHA instance?")]
    InvalidPayload,
}

/// Failure of an authenticated gateway call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// HTTP 401. Credentials have been purged by the expiry hook.
    #[error("session expired: the gateway rejected the API key")]
    SessionExpired,

    #[error("{0}")]
    RemoteCallFailed(String),
}

impl GatewayError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

/// A message could not be built from operator input.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The number contained no digits.
    #[error("no chat id: enter the recipient's phone number")]
    MissingChatId,

    #[error("message text must not be empty")]
    EmptyText,

    #[error("at least one button with text is required")]
    NoButtons,

    #[error("failed to read attachment {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Credential file could not be read or written.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential file is malformed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode credentials: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Credentials could not be adopted.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] CredentialError),

    #[error(transparent)]
    Client(#[from] GatewayError),
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

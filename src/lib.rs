#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! waha-panel library: the building blocks behind the `waha-panel` binary.
//!
//! - `credentials`: two-key credential file (host + API key)
//! - `client`: authenticated REST client for the WAHA gateway, login probe
//! - `expiry`: the session-expired hook every outbound call fires on 401
//! - `auth`: process-wide credential state, startup validation
//! - `poller`: session status polling, QR artifact lifecycle, actions
//! - `presentation`: status labels, severities, enabled actions
//! - `message`: chat-id canonicalisation and send payloads
//! - `config`: TOML + env-var configuration
//! - `error`: error enums shared across modules

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod expiry;
pub mod message;
pub mod poller;
pub mod presentation;
pub mod util;

// Re-export key types at crate root for convenience.
pub use auth::{AuthContext, AuthEvent};
pub use client::{probe, GatewayClient, MeInfo, ProbeSuccess, SessionInfo};
pub use config::Config;
pub use credentials::{CredentialStore, Credentials};
pub use error::{GatewayError, MessageError, ProbeError};
pub use expiry::ExpiryHook;
pub use message::{format_chat_id, MessagePayload};
pub use poller::{ActionOutcome, Capabilities, PollExit, SessionPoller, SessionSnapshot, TickOutcome};
pub use presentation::{SessionAction, SessionStatus, Severity, StatusView};

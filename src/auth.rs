//! Process-wide authentication state.
//!
//! [`AuthContext`] owns the current credentials and the [`GatewayClient`]
//! derived from them. The client is rebuilt whenever credentials change and
//! carries an [`ExpiryHook`] pointing back at the context: a 401 from any
//! call purges the stored and in-memory credentials and broadcasts
//! [`AuthEvent::SessionExpired`].
//!
//! ## Startup
//!
//! [`AuthContext::init`] loads stored credentials and probes them once. A
//! failed probe clears the store, so a stale key never lingers between runs.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::client::{probe, GatewayClient};
use crate::config::GatewaySettings;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::AuthError;
use crate::expiry::ExpiryHook;

/// Capacity of the auth event broadcast.
const EVENT_CAPACITY: usize = 16;

/// Authentication lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
    /// The gateway answered 401; credentials have been purged.
    SessionExpired,
}

#[derive(Default)]
struct AuthState {
    credentials: Option<Credentials>,
    client: Option<GatewayClient>,
}

struct AuthInner {
    store: CredentialStore,
    settings: GatewaySettings,
    state: RwLock<AuthState>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthInner {
    /// Drop in-memory and persisted credentials.
    fn forget(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = AuthState::default();
        if let Err(e) = self.store.clear() {
            warn!("failed to clear stored credentials: {e}");
        }
    }

    fn expire(&self) {
        warn!("session expired, credentials cleared");
        self.forget();
        let _ = self.events.send(AuthEvent::SessionExpired);
    }
}

/// Shared handle to the authentication state. Cheap to clone.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<AuthInner>,
}

impl AuthContext {
    /// An unauthenticated context. Does no I/O.
    pub fn new(store: CredentialStore, settings: GatewaySettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(AuthInner {
                store,
                settings,
                state: RwLock::new(AuthState::default()),
                events,
            }),
        }
    }

    /// Load stored credentials and adopt them if the gateway still accepts them.
    pub async fn init(store: CredentialStore, settings: GatewaySettings) -> Self {
        let ctx = Self::new(store, settings);

        let stored = match ctx.inner.store.load() {
            Ok(Some(creds)) => creds,
            Ok(None) => return ctx,
            Err(e) => {
                warn!("ignoring unreadable credential file: {e}");
                ctx.inner.forget();
                return ctx;
            }
        };

        let timeout = ctx.inner.settings.probe_timeout();
        match probe(&stored.host, &stored.api_key, timeout).await {
            Ok(_) => {
                if let Err(e) = ctx.adopt(stored) {
                    warn!("stored credentials unusable: {e}");
                    ctx.inner.forget();
                }
            }
            Err(e) => {
                warn!(host = %stored.host, "stored credentials rejected: {e}");
                ctx.inner.forget();
            }
        }
        ctx
    }

    /// Persist and adopt new credentials. The caller is expected to have probed them.
    pub fn login(&self, host: &str, api_key: &str) -> Result<(), AuthError> {
        let creds = Credentials::new(host, api_key);
        let client = self.build_client(&creds)?;
        self.inner.store.save(&creds.host, &creds.api_key)?;
        info!(host = %creds.host, "logged in");
        self.set(creds, client);
        let _ = self.inner.events.send(AuthEvent::LoggedIn);
        Ok(())
    }

    /// Clear persisted and in-memory credentials.
    pub fn logout(&self) -> Result<(), AuthError> {
        *self.inner.state.write().unwrap_or_else(PoisonError::into_inner) = AuthState::default();
        self.inner.store.clear()?;
        info!("logged out");
        let _ = self.inner.events.send(AuthEvent::LoggedOut);
        Ok(())
    }

    /// True iff both host and key are non-empty.
    pub fn is_authenticated(&self) -> bool {
        self.read_state()
            .credentials
            .as_ref()
            .is_some_and(Credentials::is_complete)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.read_state().credentials.clone()
    }

    /// Client for the current credentials; `None` when logged out.
    pub fn client(&self) -> Option<GatewayClient> {
        self.read_state().client.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.inner.settings
    }

    fn adopt(&self, creds: Credentials) -> Result<(), AuthError> {
        let client = self.build_client(&creds)?;
        info!(host = %creds.host, "stored credentials accepted");
        self.set(creds, client);
        Ok(())
    }

    fn set(&self, credentials: Credentials, client: GatewayClient) {
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        state.client = credentials.is_complete().then_some(client);
        state.credentials = Some(credentials);
    }

    /// The hook holds a weak reference: the context owns the client, not the reverse.
    fn build_client(&self, creds: &Credentials) -> Result<GatewayClient, AuthError> {
        let weak: Weak<AuthInner> = Arc::downgrade(&self.inner);
        let hook = ExpiryHook::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire();
            }
        });
        Ok(GatewayClient::new(creds, &self.inner.settings, hook)?)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, AuthState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

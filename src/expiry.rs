//! Session-expiry hook.
//!
//! Every [`GatewayClient`](crate::client::GatewayClient) carries one
//! [`ExpiryHook`] and fires it whenever the gateway answers 401. The hook is
//! installed by [`AuthContext`](crate::auth::AuthContext), which purges the
//! stored credentials and broadcasts [`AuthEvent::SessionExpired`](crate::auth::AuthEvent)
//! so running commands can stop. Call sites never test for 401 themselves.

use std::fmt;
use std::sync::Arc;

/// Callback fired on HTTP 401 from an authenticated call.
#[derive(Clone)]
pub struct ExpiryHook(Arc<dyn Fn() + Send + Sync>);

impl ExpiryHook {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A hook that does nothing (clients built outside an auth context).
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn fire(&self) {
        (self.0)();
    }
}

impl fmt::Debug for ExpiryHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExpiryHook")
    }
}

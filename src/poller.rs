//! Session status poller.
//!
//! [`SessionPoller`] tracks one gateway session. Each tick fetches the
//! session status and optionally the paired identity. While the session
//! waits for a scan it also fetches the pairing QR image, which is written
//! to disk as a [`QrArtifact`]. Lifecycle actions (create/start/stop/logout/restart) run
//! one at a time and are followed by an immediate resync tick.
//!
//! ## Ticks
//!
//! - [`SessionPoller::poll`] is the timer tick. If a tick is already in
//!   flight it is skipped ([`TickOutcome::Skipped`]); overlapping fires are
//!   coalesced, never queued.
//! - [`SessionPoller::refresh`] waits for any in-flight tick and then runs.
//!   Actions resync through it, so the post-action state is never lost.
//!
//! ## QR artifacts
//!
//! At most one QR file exists per poller. The previous file is removed
//! before a new one is written, and the file is removed whenever the status
//! leaves `SCAN_QR_CODE`, on [`SessionPoller::shutdown`], and when the
//! poller is dropped.
//!
//! ## Observation
//!
//! Every state change is published as a [`SessionSnapshot`] on a
//! `tokio::sync::watch` channel ([`SessionPoller::subscribe`]).

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{GatewayClient, MeInfo, SessionInfo, DEFAULT_SESSION};
use crate::error::GatewayError;
use crate::presentation::{SessionAction, SessionStatus};

/// Default time between timer ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// What a poller variant can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Fetch `GET /api/sessions/{name}/me` on every tick.
    pub supports_me: bool,
    /// Offer `stop` and `restart`.
    pub supports_stop: bool,
    /// Only fetch the QR for the `default` session (the QR endpoint is default-only).
    pub qr_default_only: bool,
}

impl Capabilities {
    /// The dashboard variant: default session, create/start/logout.
    pub const fn default_session() -> Self {
        Self {
            supports_me: false,
            supports_stop: false,
            qr_default_only: false,
        }
    }

    /// The per-session variant: identity, stop and restart, QR gated to `default`.
    pub const fn named() -> Self {
        Self {
            supports_me: true,
            supports_stop: true,
            qr_default_only: true,
        }
    }

    pub fn supports(self, action: SessionAction) -> bool {
        match action {
            SessionAction::Stop | SessionAction::Restart => self.supports_stop,
            SessionAction::Create | SessionAction::Start | SessionAction::Logout => true,
        }
    }
}

/// Immutable view of the poller's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub name: String,
    pub session: Option<SessionInfo>,
    pub me: Option<MeInfo>,
    /// Path of the live QR image, if any.
    pub qr_path: Option<PathBuf>,
    pub error: Option<String>,
    /// No tick has completed yet.
    pub loading: bool,
    /// An action is in flight.
    pub busy: bool,
}

impl SessionSnapshot {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            session: None,
            me: None,
            qr_path: None,
            error: None,
            loading: true,
            busy: false,
        }
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(SessionInfo::status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Refreshed,
    /// The session fetch failed; the error is in the snapshot.
    Failed,
    /// 401: credentials were purged, polling should stop.
    Expired,
    /// Another tick was in flight.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    /// Another action was in flight; nothing happened.
    Busy,
    /// This poller variant does not offer the action.
    Unsupported,
    /// The remote call failed; the error is in the snapshot.
    Failed,
    Expired,
}

/// Why [`SessionPoller::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Cancelled,
    SessionExpired,
}

/// Pairing QR image on disk. The file is removed when this is dropped.
#[derive(Debug)]
pub struct QrArtifact {
    path: PathBuf,
}

impl QrArtifact {
    /// Write `bytes` on the blocking pool.
    ///
    /// If this future is dropped mid-write, the detached task still owns the
    /// artifact and removes the file when it finishes.
    async fn create(dir: PathBuf, session: &str, bytes: Vec<u8>) -> io::Result<Self> {
        let session = session.to_string();
        tokio::task::spawn_blocking(move || Self::write(&dir, &session, &bytes))
            .await
            .map_err(io::Error::other)?
    }

    fn write(dir: &Path, session: &str, bytes: &[u8]) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let artifact = Self {
            path: dir.join(format!(
                "qr-{}-{}.png",
                file_safe(session),
                uuid::Uuid::new_v4().simple()
            )),
        };
        std::fs::write(&artifact.path, bytes)?;
        debug!(path = %artifact.path.display(), "QR artifact written");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QrArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "QR artifact released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove QR artifact: {e}"),
        }
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Mutable state behind the poller's lock.
struct PollerState {
    session: Option<SessionInfo>,
    me: Option<MeInfo>,
    qr: Option<QrArtifact>,
    error: Option<String>,
    loading: bool,
}

/// Clears the busy flag even if the action future is dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls one session and runs lifecycle actions against it.
pub struct SessionPoller {
    client: GatewayClient,
    name: String,
    caps: Capabilities,
    qr_dir: PathBuf,
    interval: Duration,
    state: Mutex<PollerState>,
    busy: AtomicBool,
    /// Held for the duration of a tick.
    tick_lock: Mutex<()>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionPoller {
    /// A poller for `name` (empty means `default`).
    pub fn new(client: GatewayClient, name: &str, caps: Capabilities) -> Self {
        let name = if name.is_empty() { DEFAULT_SESSION } else { name };
        let (updates, _) = watch::channel(SessionSnapshot::empty(name));
        Self {
            client,
            name: name.to_string(),
            caps,
            qr_dir: std::env::temp_dir(),
            interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(PollerState {
                session: None,
                me: None,
                qr: None,
                error: None,
                loading: true,
            }),
            busy: AtomicBool::new(false),
            tick_lock: Mutex::new(()),
            updates,
        }
    }

    /// Directory QR images are written to (default: the system temp dir).
    #[must_use]
    pub fn with_qr_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.qr_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Timer tick: skipped if another tick is in flight.
    pub async fn poll(&self) -> TickOutcome {
        let Ok(_tick) = self.tick_lock.try_lock() else {
            debug!(session = %self.name, "tick already in flight, skipping");
            return TickOutcome::Skipped;
        };
        self.tick().await
    }

    /// Tick now, after any in-flight tick finishes.
    pub async fn refresh(&self) -> TickOutcome {
        let _tick = self.tick_lock.lock().await;
        self.tick().await
    }

    async fn tick(&self) -> TickOutcome {
        self.state.lock().await.error = None;

        let session = match self.client.get_session(&self.name).await {
            Ok(s) => s,
            Err(GatewayError::SessionExpired) => return TickOutcome::Expired,
            Err(GatewayError::RemoteCallFailed(message)) => {
                warn!(session = %self.name, "status fetch failed: {message}");
                let mut state = self.state.lock().await;
                state.session = None;
                state.me = None;
                state.qr = None;
                state.error = Some(message);
                state.loading = false;
                self.publish(&state);
                return TickOutcome::Failed;
            }
        };

        let me = if self.caps.supports_me {
            match self.client.get_me(&self.name).await {
                Ok(me) => me,
                Err(GatewayError::SessionExpired) => return TickOutcome::Expired,
                Err(e) => {
                    debug!(session = %self.name, "identity fetch failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        let qr_bytes = if self.wants_qr(&session) {
            match self.client.get_qr().await {
                Ok(bytes) => Some(bytes),
                Err(GatewayError::SessionExpired) => return TickOutcome::Expired,
                Err(e) => {
                    warn!(session = %self.name, "QR fetch failed: {e}");
                    None
                }
            }
        } else {
            None
        };

        // Release the previous artifact before writing a new one, and do the
        // file work without holding the state lock.
        let stale = self.state.lock().await.qr.take();
        drop(stale);
        let qr = match qr_bytes {
            Some(bytes) => match QrArtifact::create(self.qr_dir.clone(), &self.name, bytes).await {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    warn!(session = %self.name, "failed to write QR image: {e}");
                    None
                }
            },
            None => None,
        };

        let mut state = self.state.lock().await;
        debug!(session = %self.name, status = %session.status, "session refreshed");
        state.session = Some(session);
        state.me = me;
        state.qr = qr;
        state.loading = false;
        self.publish(&state);
        TickOutcome::Refreshed
    }

    fn wants_qr(&self, session: &SessionInfo) -> bool {
        session.status() == SessionStatus::ScanQrCode
            && (!self.caps.qr_default_only || self.name == DEFAULT_SESSION)
    }

    pub async fn create(&self) -> ActionOutcome {
        self.run_action(SessionAction::Create).await
    }

    pub async fn start(&self) -> ActionOutcome {
        self.run_action(SessionAction::Start).await
    }

    pub async fn stop(&self) -> ActionOutcome {
        self.run_action(SessionAction::Stop).await
    }

    pub async fn logout(&self) -> ActionOutcome {
        self.run_action(SessionAction::Logout).await
    }

    pub async fn restart(&self) -> ActionOutcome {
        self.run_action(SessionAction::Restart).await
    }

    /// Run one lifecycle action, then resync.
    ///
    /// A failed call records its message and does not resync; a 401 skips
    /// the resync as well.
    pub async fn run_action(&self, action: SessionAction) -> ActionOutcome {
        if !self.caps.supports(action) {
            return ActionOutcome::Unsupported;
        }
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!(session = %self.name, %action, "action already in flight, ignoring");
            return ActionOutcome::Busy;
        }
        let guard = BusyGuard(&self.busy);
        self.publish_current().await;

        info!(session = %self.name, %action, "running session action");
        let outcome = match self.client.run_action(&self.name, action).await {
            Ok(_) => match self.refresh().await {
                TickOutcome::Expired => ActionOutcome::Expired,
                _ => ActionOutcome::Done,
            },
            Err(GatewayError::SessionExpired) => ActionOutcome::Expired,
            Err(GatewayError::RemoteCallFailed(message)) => {
                warn!(session = %self.name, %action, "action failed: {message}");
                self.state.lock().await.error = Some(message);
                ActionOutcome::Failed
            }
        };

        drop(guard);
        self.publish_current().await;
        outcome
    }

    /// Tick every interval until cancelled or the session expires.
    ///
    /// The first tick fires immediately. Cancelling abandons any request
    /// still in flight. QR artifacts are released on exit.
    pub async fn run(&self, cancel: CancellationToken) -> PollExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            tokio::select! {
                () = cancel.cancelled() => break PollExit::Cancelled,
                _ = ticker.tick() => {
                    // An in-flight tick is abandoned on cancel.
                    tokio::select! {
                        () = cancel.cancelled() => break PollExit::Cancelled,
                        outcome = self.poll() => {
                            if outcome == TickOutcome::Expired {
                                break PollExit::SessionExpired;
                            }
                        }
                    }
                }
            }
        };

        debug!(session = %self.name, ?exit, "poll loop stopped");
        self.shutdown().await;
        exit
    }

    /// Release the QR artifact.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.qr.take().is_some() {
            self.publish(&state);
        }
    }

    async fn publish_current(&self) {
        let state = self.state.lock().await;
        self.publish(&state);
    }

    fn publish(&self, state: &PollerState) {
        self.updates.send_replace(SessionSnapshot {
            name: self.name.clone(),
            session: state.session.clone(),
            me: state.me.clone(),
            qr_path: state.qr.as_ref().map(|a| a.path.clone()),
            error: state.error.clone(),
            loading: state.loading,
            busy: self.is_busy(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_presets() {
        let basic = Capabilities::default_session();
        assert!(basic.supports(SessionAction::Create));
        assert!(basic.supports(SessionAction::Start));
        assert!(basic.supports(SessionAction::Logout));
        assert!(!basic.supports(SessionAction::Stop));
        assert!(!basic.supports(SessionAction::Restart));

        let named = Capabilities::named();
        assert!(named.supports(SessionAction::Stop));
        assert!(named.supports(SessionAction::Restart));
        assert!(named.supports_me);
    }

    #[tokio::test]
    async fn qr_artifact_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = QrArtifact::create(dir.path().to_path_buf(), "sales/eu", b"png".to_vec())
            .await
            .unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("qr-sales_eu-"));
        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn file_names_are_path_safe() {
        assert_eq!(file_safe("default"), "default");
        assert_eq!(file_safe("team a/../b"), "team_a____b");
    }

    #[test]
    fn empty_snapshot_is_loading() {
        let snapshot = SessionSnapshot::empty("default");
        assert!(snapshot.loading);
        assert!(!snapshot.busy);
        assert!(snapshot.status().is_none());
    }
}

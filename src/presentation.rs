//! Status presentation: pure mapping from session state to what the operator sees.
//!
//! Nothing here performs I/O. Given a status, [`status_view`] returns a label
//! and a [`Severity`]; given the status, whether a session exists and the
//! poller's [`Capabilities`], [`enabled_actions`] returns the actions worth
//! offering. Unknown or absent statuses always get the STOPPED treatment.

use std::fmt;

use colored::{Color, Colorize};

use crate::poller::{Capabilities, SessionSnapshot};

/// Gateway-reported session status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Stopped,
    Starting,
    ScanQrCode,
    Working,
    Failed,
    /// Anything the gateway sends that we don't know.
    Unknown(String),
}

impl SessionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "STOPPED" => Self::Stopped,
            "STARTING" => Self::Starting,
            "SCAN_QR_CODE" => Self::ScanQrCode,
            "WORKING" => Self::Working,
            "FAILED" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::ScanQrCode => "SCAN_QR_CODE",
            Self::Working => "WORKING",
            Self::Failed => "FAILED",
            Self::Unknown(raw) => raw,
        }
    }

    /// Session is up or coming up (QR pending, connected, booting).
    fn is_active(&self) -> bool {
        matches!(self, Self::ScanQrCode | Self::Working | Self::Starting)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual severity of a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Neutral,
    Pending,
    Attention,
    Healthy,
    Critical,
}

impl Severity {
    pub fn color(self) -> Color {
        match self {
            Self::Neutral => Color::BrightBlack,
            Self::Pending => Color::Yellow,
            Self::Attention => Color::Blue,
            Self::Healthy => Color::Green,
            Self::Critical => Color::Red,
        }
    }
}

/// Label + severity for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusView {
    pub label: &'static str,
    pub severity: Severity,
}

const STOPPED_VIEW: StatusView = StatusView {
    label: "Stopped",
    severity: Severity::Neutral,
};

pub fn status_view(status: Option<&SessionStatus>) -> StatusView {
    match status {
        Some(SessionStatus::Starting) => StatusView {
            label: "Starting",
            severity: Severity::Pending,
        },
        Some(SessionStatus::ScanQrCode) => StatusView {
            label: "Scan the QR code",
            severity: Severity::Attention,
        },
        Some(SessionStatus::Working) => StatusView {
            label: "Connected",
            severity: Severity::Healthy,
        },
        Some(SessionStatus::Failed) => StatusView {
            label: "Failed",
            severity: Severity::Critical,
        },
        Some(SessionStatus::Stopped | SessionStatus::Unknown(_)) | None => STOPPED_VIEW,
    }
}

/// Lifecycle actions the poller can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SessionAction {
    Create,
    Start,
    Stop,
    Logout,
    Restart,
}

impl SessionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Logout => "logout",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions to offer for the current state, in display order.
pub fn enabled_actions(
    status: Option<&SessionStatus>,
    session_exists: bool,
    caps: Capabilities,
) -> Vec<SessionAction> {
    if !session_exists {
        return vec![SessionAction::Create];
    }

    let mut actions = Vec::with_capacity(3);
    if status.is_some_and(SessionStatus::is_active) {
        if caps.supports_stop {
            actions.push(SessionAction::Stop);
        }
        actions.push(SessionAction::Logout);
    } else {
        actions.push(SessionAction::Start);
    }
    if caps.supports_stop {
        actions.push(SessionAction::Restart);
    }
    actions
}

/// Connected number: identity endpoint first, then the session body; `-` when unknown.
pub fn phone_number(snapshot: &SessionSnapshot) -> &str {
    snapshot
        .me
        .as_ref()
        .and_then(|me| me.display_id())
        .or_else(|| {
            snapshot
                .session
                .as_ref()
                .and_then(|s| s.me.as_ref())
                .and_then(|me| me.display_id())
        })
        .unwrap_or("-")
}

/// Plain-text status card for one snapshot.
pub fn render_card(snapshot: &SessionSnapshot, caps: Capabilities) -> String {
    let mut out = String::new();
    write_card(&mut out, snapshot, caps).map(|()| out).unwrap_or_default()
}

fn write_card(
    out: &mut impl fmt::Write,
    snapshot: &SessionSnapshot,
    caps: Capabilities,
) -> fmt::Result {
    let status = snapshot.session.as_ref().map(|s| s.status());
    let view = status_view(status.as_ref());

    writeln!(out, "Session  {}", snapshot.name.bold())?;
    if snapshot.loading {
        writeln!(out, "Status   {}", "loading…".dimmed())?;
    } else {
        writeln!(out, "Status   {}", view.label.color(view.severity.color()))?;
    }
    writeln!(out, "Number   {}", phone_number(snapshot))?;
    if let Some(qr) = &snapshot.qr_path {
        writeln!(out, "QR       {}", qr.display())?;
    }
    if let Some(err) = &snapshot.error {
        writeln!(out, "Error    {}", err.red())?;
    }

    if snapshot.busy {
        writeln!(out, "Actions  (working…)")
    } else {
        let actions: Vec<&str> =
            enabled_actions(status.as_ref(), snapshot.session.is_some(), caps)
                .into_iter()
                .map(SessionAction::as_str)
                .collect();
        writeln!(out, "Actions  {}", actions.join(", "))
    }
}

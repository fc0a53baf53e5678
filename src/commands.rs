//! Command handlers for the `waha-panel` binary.
//!
//! Each handler takes the already-initialised [`AuthContext`] and prints to
//! stdout. Failures propagate as `anyhow::Error`; a [`GatewayError::SessionExpired`]
//! anywhere in the chain makes `main` exit with status 2.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use waha_panel::client::session_names;
use waha_panel::message::{Attachment, Button, MediaKind};
use waha_panel::poller::PollExit;
use waha_panel::presentation::render_card;
use waha_panel::{
    probe, ActionOutcome, AuthContext, AuthEvent, Capabilities, Config, GatewayClient,
    GatewayError, MessagePayload, SessionAction, SessionPoller, SessionStatus, TickOutcome,
};

use crate::{ProfileCommand, SendKind};

pub struct Panel {
    config: Config,
    auth: AuthContext,
}

impl Panel {
    pub fn new(config: Config, auth: AuthContext) -> Self {
        Self { config, auth }
    }

    fn client(&self) -> Result<GatewayClient> {
        self.auth.client().ok_or_else(|| {
            anyhow!("not logged in: run `waha-panel login --host <URL> --api-key <KEY>` first")
        })
    }

    fn poller(&self, session: &str, caps: Capabilities) -> Result<SessionPoller> {
        Ok(SessionPoller::new(self.client()?, session, caps)
            .with_qr_dir(self.config.storage.qr_path())
            .with_interval(self.config.poller.interval()))
    }

    // --- Auth ---

    pub async fn login(&self, host: &str, api_key: &str) -> Result<()> {
        let checked = probe(host, api_key, self.config.gateway.probe_timeout())
            .await
            .context("login failed")?;
        let creds = &checked.credentials;
        self.auth
            .login(&creds.host, &creds.api_key)
            .context("failed to save credentials")?;

        println!("{} {}", "Logged in to".green(), creds.host.bold());
        let names = session_names(&Value::Array(checked.sessions));
        println!("Sessions: {}", names.join(", "));
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.auth.logout().context("failed to clear credentials")?;
        println!("Logged out.");
        Ok(())
    }

    pub fn whoami(&self) {
        match self.auth.credentials() {
            Some(creds) if self.auth.is_authenticated() => {
                println!("Host           {}", creds.host);
                println!("Authenticated  {}", "yes".green());
            }
            _ => println!("Authenticated  {}", "no".red()),
        }
        println!(
            "Credentials    {}",
            self.config.storage.credentials_path().display()
        );
    }

    // --- Sessions ---

    pub async fn sessions(&self) -> Result<()> {
        let list = self.client()?.list_sessions().await?;
        for name in session_names(&list) {
            println!("{name}");
        }
        Ok(())
    }

    pub async fn status(&self, session: &str) -> Result<()> {
        let poller = self.poller(session, Capabilities::named())?;
        let outcome = poller.refresh().await;
        if outcome == TickOutcome::Expired {
            return Err(GatewayError::SessionExpired.into());
        }
        // The QR file would outlive this process otherwise.
        poller.shutdown().await;
        print_snapshot(&poller);
        Ok(())
    }

    pub async fn session_action(&self, session: &str, action: SessionAction) -> Result<()> {
        let poller = self.poller(session, Capabilities::named())?;
        let outcome = poller.run_action(action).await;
        debug!(?outcome, "action finished");
        match outcome {
            ActionOutcome::Done => {
                poller.shutdown().await;
                println!("{} {action} {}", "✓".green(), poller.name());
                print_snapshot(&poller);
                Ok(())
            }
            ActionOutcome::Expired => Err(GatewayError::SessionExpired.into()),
            ActionOutcome::Failed => {
                let message = poller
                    .snapshot()
                    .error
                    .unwrap_or_else(|| "unknown error".to_string());
                bail!("{action} {} failed: {message}", poller.name())
            }
            ActionOutcome::Busy | ActionOutcome::Unsupported => {
                bail!("{action} is not available for {}", poller.name())
            }
        }
    }

    pub async fn dashboard(&self) -> Result<()> {
        self.watch_with(waha_panel::client::DEFAULT_SESSION, Capabilities::default_session())
            .await
    }

    pub async fn watch(&self, session: &str) -> Result<()> {
        self.watch_with(session, Capabilities::named()).await
    }

    /// Poll until Ctrl-C or session expiry, printing a card on every change.
    async fn watch_with(&self, session: &str, caps: Capabilities) -> Result<()> {
        let poller = Arc::new(self.poller(session, caps)?);
        let mut updates = poller.subscribe();
        let mut events = self.auth.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let poller = Arc::clone(&poller);
            let cancel = cancel.clone();
            async move { poller.run(cancel).await }
        });
        info!(session = poller.name(), "watching session");
        eprintln!("Watching {} (Ctrl-C to stop)", poller.name().bold());

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut last = None;

        let result: Result<()> = loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if snapshot.loading || last.as_ref() == Some(&snapshot) {
                        continue;
                    }
                    println!("{}", render_card(&snapshot, caps));
                    if snapshot.status() == Some(SessionStatus::ScanQrCode) && snapshot.qr_path.is_none() {
                        println!("{}", "QR code unavailable for this session.".dimmed());
                    }
                    last = Some(snapshot);
                }
                event = events.recv() => match event {
                    Ok(AuthEvent::SessionExpired) => break Err(GatewayError::SessionExpired.into()),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break Ok(()),
                },
                _ = &mut ctrl_c => break Ok(()),
            }
        };

        cancel.cancel();
        match task.await {
            Ok(PollExit::SessionExpired) => Err(GatewayError::SessionExpired.into()),
            Ok(PollExit::Cancelled) => result,
            Err(e) => Err(anyhow!("poller task failed: {e}")),
        }
    }

    // --- Profile ---

    pub async fn profile(&self, command: ProfileCommand) -> Result<()> {
        let client = self.client()?;
        match command {
            ProfileCommand::Show => {}
            ProfileCommand::Name { name } => {
                client.set_profile_name(&name).await?;
                println!("{}", "Profile name updated.".green());
            }
            ProfileCommand::Status { text } => {
                client.set_profile_status(&text).await?;
                println!("{}", "Profile status updated.".green());
            }
            ProfileCommand::Picture { file } => {
                let picture = Attachment::read(&file).await?;
                client.set_profile_picture(picture).await?;
                println!("{}", "Profile picture updated.".green());
            }
            ProfileCommand::RemovePicture => {
                client.delete_profile_picture().await?;
                println!("{}", "Profile picture removed.".green());
            }
        }
        let profile = client.get_profile().await?;
        println!("{}", serde_json::to_string_pretty(&profile)?);
        Ok(())
    }

    // --- Sending ---

    pub async fn send(
        &self,
        kind: SendKind,
        session: &str,
        to: &str,
        text: Option<&str>,
        file: Option<&Path>,
        buttons: &[String],
    ) -> Result<()> {
        let client = self.client()?;
        let payload = match kind {
            SendKind::Text => MessagePayload::text(session, to, text.unwrap_or_default())?,
            SendKind::Buttons => MessagePayload::buttons(
                session,
                to,
                text.unwrap_or_default(),
                Button::from_labels(buttons),
            )?,
            SendKind::Image | SendKind::File | SendKind::Voice | SendKind::Video => {
                let path = file.context("--file is required for media messages")?;
                let attachment = Attachment::read(path).await?;
                MessagePayload::media(session, to, media_kind(kind), attachment)?
            }
        };

        let chat_id = payload.chat_id.clone();
        let response = client.send(payload).await?;
        debug!(%response, "send response");
        println!("{} {chat_id}", "Sent to".green());
        Ok(())
    }
}

fn media_kind(kind: SendKind) -> MediaKind {
    match kind {
        SendKind::Image => MediaKind::Image,
        SendKind::Voice => MediaKind::Voice,
        SendKind::Video => MediaKind::Video,
        SendKind::File | SendKind::Text | SendKind::Buttons => MediaKind::File,
    }
}

fn print_snapshot(poller: &SessionPoller) {
    let snapshot = poller.snapshot();
    print!("{}", render_card(&snapshot, poller.capabilities()));
    if snapshot.status() == Some(SessionStatus::ScanQrCode) {
        println!(
            "{}",
            "Waiting for a QR scan: run `waha-panel watch` to keep the QR image on disk.".dimmed()
        );
    }
}

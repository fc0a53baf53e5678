//! # waha-panel
//!
//! Command-line admin panel for a WAHA (WhatsApp HTTP API) gateway.
//!
//! ## Subcommands
//!
//! | Command                          | Description                                   |
//! |----------------------------------|-----------------------------------------------|
//! | `login --host H --api-key K`     | Probe the gateway, save credentials           |
//! | `logout`                         | Forget stored credentials                     |
//! | `whoami`                         | Show the stored host and auth state           |
//! | `sessions`                       | List session names (`default` first)          |
//! | `status [--session N]`           | One poll, print the status card               |
//! | `dashboard`                      | Watch the default session                     |
//! | `watch [--session N]`            | Watch any session (identity, stop, restart)   |
//! | `session <action> [--session N]` | create / start / stop / logout / restart      |
//! | `profile <cmd>`                  | Show or edit the default session's profile    |
//! | `send <kind> --to NUMBER`        | Send text, media or buttons                   |
//!
//! Exit status is 1 on any error and 2 when the gateway rejected the stored
//! API key (credentials are cleared; run `login` again).

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::debug;

use waha_panel::client::DEFAULT_SESSION;
use waha_panel::{AuthContext, Config, CredentialStore, GatewayError, SessionAction};

use commands::Panel;

/// Admin panel for a WAHA WhatsApp gateway.
#[derive(Parser)]
#[command(name = "waha-panel", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a gateway host and API key, then save them.
    Login {
        /// Gateway base URL, e.g. https://waha.example.com
        #[arg(long)]
        host: String,
        #[arg(long)]
        api_key: String,
    },
    /// Forget stored credentials.
    Logout,
    /// Show the stored host and whether it is authenticated.
    Whoami,
    /// List sessions known to the gateway.
    Sessions,
    /// Poll a session once and print its status.
    Status {
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
    },
    /// Watch the default session until Ctrl-C.
    Dashboard,
    /// Watch a session until Ctrl-C, with identity and stop/restart.
    Watch {
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
    },
    /// Run a lifecycle action on a session.
    Session {
        #[arg(value_enum)]
        action: SessionAction,
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
    },
    /// Show or edit the default session's WhatsApp profile.
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Send a message.
    Send {
        #[arg(value_enum)]
        kind: SendKind,
        /// Recipient phone number; non-digits are ignored.
        #[arg(long)]
        to: String,
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
        /// Message text (text and buttons).
        #[arg(long)]
        text: Option<String>,
        /// File to upload (image, file, voice, video).
        #[arg(long)]
        file: Option<PathBuf>,
        /// Button label; repeat for more buttons.
        #[arg(long = "button")]
        buttons: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Print the current profile.
    Show,
    /// Set the display name.
    Name { name: String },
    /// Set the "about" text.
    Status { text: String },
    /// Upload a new profile picture.
    Picture { file: PathBuf },
    /// Remove the profile picture.
    RemovePicture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SendKind {
    Text,
    Image,
    File,
    Voice,
    Video,
    Buttons,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("waha-panel: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    let store = CredentialStore::new(config.storage.credentials_path());
    debug!(path = %store.path().display(), "credential store");
    let auth = AuthContext::init(store, config.gateway.clone()).await;
    let panel = Panel::new(config, auth);

    let result = match cli.command {
        Commands::Login { host, api_key } => panel.login(&host, &api_key).await,
        Commands::Logout => panel.logout(),
        Commands::Whoami => {
            panel.whoami();
            Ok(())
        }
        Commands::Sessions => panel.sessions().await,
        Commands::Status { session } => panel.status(&session).await,
        Commands::Dashboard => panel.dashboard().await,
        Commands::Watch { session } => panel.watch(&session).await,
        Commands::Session { action, session } => panel.session_action(&session, action).await,
        Commands::Profile { command } => panel.profile(command).await,
        Commands::Send {
            kind,
            to,
            session,
            text,
            file,
            buttons,
        } => {
            panel
                .send(kind, &session, &to, text.as_deref(), file.as_deref(), &buttons)
                .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_session_expired(&e) => {
            eprintln!(
                "{} the gateway rejected the API key; credentials were cleared. Run `waha-panel login` again.",
                "session expired:".red().bold()
            );
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn is_session_expired(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<GatewayError>()
            .is_some_and(GatewayError::is_session_expired)
    })
}

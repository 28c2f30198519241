//! # ssgs
//!
//! Keeps slider projects in sync between a master site and its secondaries
//! through a git repository.
//!
//! - `ssgs init` writes a starter `config.toml`
//! - `ssgs export` exports every mapped project and pushes (master)
//! - `ssgs import` pulls and re-imports what changed (secondary)
//! - `ssgs push-token`, `remote-import`, `clear-cache` call secondary sites
//! - `ssgs receive` answers such a call (secondary)
//! - `ssgs status` shows timestamps, ids and the last outcome per site
//! - `ssgs home` prints the ssgs home directory

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use ssgs::{
    cmd_clear_cache, cmd_encrypt, cmd_export, cmd_home, cmd_import, cmd_init, cmd_push_token,
    cmd_receive, cmd_remote_import, cmd_status,
};

#[derive(Parser, Debug)]
#[command(
    name = "ssgs",
    version,
    about = "ssgs - slider git sync between a master site and its secondaries",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a commented config.toml if none exists
    Init,
    /// Print the ssgs home directory
    Home,
    /// Export all mapped projects, commit and push
    Export,
    /// Pull and import changed projects
    Import {
        /// Repeat every N seconds until Ctrl-C
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },
    /// Send a repository token to secondary sites
    PushToken {
        #[arg(long)]
        token: String,
        #[arg(long)]
        username: Option<String>,
        /// Secondary site labels
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// Ask secondary sites to pull and import
    RemoteImport {
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// Ask secondary sites to clear their project caches
    ClearCache {
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// Show sync timestamps, project ids and dispatch outcomes
    Status,
    /// Print the encrypted form of a secret for config.toml
    Encrypt { plaintext: String },
    /// Handle one inbound request (body on stdin): token, import or clear-cache
    Receive {
        endpoint: String,
        /// Value of the X-SSGS-Secret header
        #[arg(long)]
        secret_header: Option<String>,
    },
}

fn main() -> Result<()> {
    if let Err(e) = ssgs::logging::init() {
        eprintln!("logging disabled: {e}");
    }

    let cli = Cli::parse();
    let cmd = cli.cmd.ok_or_else(|| anyhow!("no command given"))?;

    match cmd {
        Cmd::Init => cmd_init(),
        Cmd::Home => cmd_home(),
        Cmd::Export => cmd_export(),
        Cmd::Import { every } => cmd_import(every),
        Cmd::PushToken {
            token,
            username,
            labels,
        } => cmd_push_token(&token, username.as_deref(), &labels),
        Cmd::RemoteImport { labels } => cmd_remote_import(&labels),
        Cmd::ClearCache { labels } => cmd_clear_cache(&labels),
        Cmd::Status => cmd_status(),
        Cmd::Encrypt { plaintext } => cmd_encrypt(&plaintext),
        Cmd::Receive {
            endpoint,
            secret_header,
        } => cmd_receive(&endpoint, secret_header.as_deref()),
    }
}

use std::path::PathBuf;

use crate::registry::id::DEFAULT_PREFIX;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const ADMIN_TOKEN_ENV: &str = "KEYWARD_ADMIN_TOKEN";
pub const LOADER_TOKEN_ENV: &str = "KEYWARD_LOADER_TOKEN";
pub const LOCK_FILE: &str = "keyward.lock";

#[derive(clap::Parser, Debug, Clone)]
#[command(name = "keyward", version, about = "Issue, validate and expire access keys")]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Directory holding the registry file (default: the XDG data dir).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Prefix of issued keys.
    #[arg(long, default_value = DEFAULT_PREFIX, global = true)]
    pub prefix: String,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API and the operator console (default).
    Serve(ServeArgs),
    #[command(flatten)]
    Admin(AdminCommand),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,
    /// Bearer token granting HTTP callers administrative access.
    #[arg(long, env = ADMIN_TOKEN_ENV, hide_env_values = true)]
    pub admin_token: Option<String>,
    /// Bearer token that may only fetch the active key ids (`GET /keys`).
    #[arg(long, env = LOADER_TOKEN_ENV, hide_env_values = true)]
    pub loader_token: Option<String>,
    /// Do not read operator commands from stdin.
    #[arg(long)]
    pub no_console: bool,
    /// Keep the registry in memory only; nothing is written to disk.
    #[arg(long)]
    pub ephemeral: bool,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            admin_token: std::env::var(ADMIN_TOKEN_ENV).ok(),
            loader_token: std::env::var(LOADER_TOKEN_ENV).ok(),
            no_console: false,
            ephemeral: false,
        }
    }
}

/// Administrative commands, shared by the one-shot CLI and the console.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Issue a key valid for DURATION (12h, 7d, 30d, 3m, 1a, ...).
    #[command(alias = "createkey")]
    Create { duration: String },
    /// Delete a key.
    #[command(alias = "deletekey")]
    Delete { key: String },
    /// List active keys.
    #[command(alias = "listkeys")]
    List,
    /// Check whether a key is valid.
    #[command(alias = "checkkey")]
    Check { key: String },
    /// Flip the used flag of a key.
    #[command(alias = "usekey")]
    Toggle { key: String },
    /// Delete every key.
    #[command(alias = "clearkeys")]
    Clear,
}

impl Config {
    /// `--data-dir`, or the platform data directory for keyward.
    pub fn resolve_data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(directories::ProjectDirs::from("", "", "keyward")
            .ok_or_else(|| anyhow::anyhow!("cannot determine XDG data dir"))?
            .data_dir()
            .to_path_buf())
    }
}

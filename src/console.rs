//! Operator console: administrative commands read line by line from a text
//! stream (the server's stdin) and answered in plain text.
//!
//! The console runs inside the server process and talks to the same
//! [`RegistryService`] as the HTTP API. Whoever can type into it owns the
//! process, so every console command is privileged.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::AdminCommand;
use crate::registry::{RegistryError, RegistryService, id};
use crate::retry::with_storage_retry;

pub const CONSOLE_PRINCIPAL: &str = "console";

#[derive(clap::Parser, Debug)]
#[command(
    no_binary_name = true,
    disable_version_flag = true,
    help_template = "{subcommands}"
)]
struct ConsoleLine {
    #[command(subcommand)]
    command: AdminCommand,
}

/// What a single input line turned into.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Command(AdminCommand),
    /// Help text or a usage error, to be shown as-is.
    Reply(String),
    Empty,
}

/// Parse one console line. A leading `/` is accepted, so `/createkey 7d`
/// works as well as `create 7d`.
pub fn parse_line(line: &str) -> Parsed {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line);
    if line.is_empty() {
        return Parsed::Empty;
    }
    match ConsoleLine::try_parse_from(line.split_whitespace()) {
        Ok(parsed) => Parsed::Command(parsed.command),
        Err(e) => Parsed::Reply(e.to_string().trim_end().to_string()),
    }
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::<chrono::Utc>::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Run `command` against the registry and render the reply text.
/// Storage failures are retried; every other error is returned as is.
pub fn execute(
    registry: &RegistryService,
    command: &AdminCommand,
    principal: &str,
    is_privileged: bool,
) -> Result<String, RegistryError> {
    match command {
        AdminCommand::Create { duration } => {
            let record = with_storage_retry("create", || registry.create(duration, principal, is_privileged))?;
            Ok(format!(
                "Key created: {}\nExpires: {}",
                record.id(),
                format_timestamp(record.expires_at())
            ))
        }
        AdminCommand::Delete { key } => {
            with_storage_retry("delete", || registry.delete(key, is_privileged))?;
            Ok(format!("Key deleted: {}", id::normalize(key)))
        }
        AdminCommand::List => {
            let records = with_storage_retry("list", || registry.list(is_privileged))?;
            if records.is_empty() {
                return Ok("No active keys.".to_string());
            }
            let mut out = format!("Active keys ({}):", records.len());
            for record in &records {
                out.push_str(&format!(
                    "\n{}  expires {}{}",
                    record.id(),
                    format_timestamp(record.expires_at()),
                    if record.used() { "  [used]" } else { "" }
                ));
            }
            Ok(out)
        }
        AdminCommand::Check { key } => {
            let record = with_storage_retry("check", || registry.get(key))?;
            Ok(format!(
                "Key valid: {}\nExpires: {}{}",
                record.id(),
                format_timestamp(record.expires_at()),
                if record.used() { "\nMarked as used" } else { "" }
            ))
        }
        AdminCommand::Toggle { key } => {
            let used = with_storage_retry("toggle", || registry.toggle_used(key, is_privileged))?;
            let state = if used { "used" } else { "unused" };
            Ok(format!("Key {} marked {state}", id::normalize(key)))
        }
        AdminCommand::Clear => {
            let removed = with_storage_retry("clear", || registry.clear_all(is_privileged))?;
            Ok(format!("Deleted {removed} key(s)."))
        }
    }
}

/// Operator-facing text for a failed command.
pub fn render_error(command: &AdminCommand, err: &RegistryError) -> String {
    match (command, err) {
        (AdminCommand::Check { .. }, RegistryError::NotFound { id }) => {
            format!("Key invalid or expired: {id}")
        }
        (_, RegistryError::Storage(_)) => format!("Error: {err}. The registry was not changed."),
        _ => format!("Error: {err}"),
    }
}

/// Read commands from `input` until EOF, writing one reply per command.
pub async fn run_console<R, W>(registry: Arc<RegistryService>, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tracing::info!("Operator console ready");
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_line(&line) {
            Parsed::Empty => continue,
            Parsed::Reply(text) => text,
            Parsed::Command(command) => {
                tracing::debug!(?command, "Console command");
                let registry = registry.clone();
                let cmd = command.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    execute(&registry, &cmd, CONSOLE_PRINCIPAL, true)
                })
                .await;
                match outcome {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => render_error(&command, &e),
                    Err(e) => {
                        tracing::error!(error = %e, "Console command panicked");
                        format!("Error: command aborted ({e})")
                    }
                }
            }
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    tracing::info!("Operator console closed (end of input)");
    Ok(())
}

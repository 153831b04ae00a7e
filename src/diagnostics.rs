use std::net::SocketAddr;
use std::path::Path;

use crate::config::{ADMIN_TOKEN_ENV, Config, ServeArgs};
use crate::registry::IdGenerator;

const MIN_TOKEN_LEN: usize = 16;

/// Preflight checks. Hard problems are collected and reported together;
/// soft ones are logged as warnings.
pub fn check(cfg: &Config, data_dir: &Path, serve: Option<&ServeArgs>) -> anyhow::Result<()> {
    let mut errors: Vec<String> = Vec::new();

    // Check 1: key prefix
    if let Err(e) = IdGenerator::new(&cfg.prefix) {
        errors.push(format!("{e}\n  → pass e.g. --prefix WHITE"));
    }

    // Check 2: data directory writable (skipped for in-memory registries)
    if !serve.is_some_and(|s| s.ephemeral) {
        if let Err(e) = std::fs::create_dir_all(data_dir)
            .and_then(|_| tempfile::NamedTempFile::new_in(data_dir).map(drop))
        {
            errors.push(format!(
                "data directory {} is not writable: {e}\n  \
                 → choose another one with --data-dir",
                data_dir.display()
            ));
        }
    }

    if let Some(serve) = serve {
        // Check 3: listen address
        if let Err(e) = serve.listen.parse::<SocketAddr>() {
            errors.push(format!(
                "invalid listen address '{}': {e}\n  \
                 → use host:port, e.g. --listen 0.0.0.0:8080",
                serve.listen
            ));
        }

        // Check 4: admin token (soft)
        match serve.admin_token.as_deref() {
            None | Some("") => tracing::warn!(
                "No admin token configured ({ADMIN_TOKEN_ENV}); HTTP administration is disabled"
            ),
            Some(token) if token.len() < MIN_TOKEN_LEN => tracing::warn!(
                min_len = MIN_TOKEN_LEN,
                "Admin token is short; use a long random value"
            ),
            Some(_) => {}
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        eprintln!("ERROR: {err}");
    }
    anyhow::bail!("{} preflight check(s) failed", errors.len());
}

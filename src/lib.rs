pub mod api;
pub mod config;
pub mod console;
pub mod diagnostics;
pub mod error;
pub mod registry;
pub mod retry;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{AdminCommand, Command, Config, LOCK_FILE, ServeArgs};
use registry::{IdGenerator, RegistryService};
use store::{CredentialStore, FileBackend, MemoryBackend, RegistryBackend};

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();
}

/// Load the registry from `data_dir` (or memory) and wrap it in the service.
pub fn open_registry(data_dir: &Path, prefix: &str, ephemeral: bool) -> error::Result<Arc<RegistryService>> {
    let ids = IdGenerator::new(prefix)?;
    let backend: Arc<dyn RegistryBackend> = if ephemeral {
        Arc::new(MemoryBackend::new())
    } else {
        std::fs::create_dir_all(data_dir)?;
        Arc::new(FileBackend::new(data_dir))
    };
    let store = CredentialStore::load(backend.clone())?;
    tracing::info!(
        backend = backend.describe(),
        count = store.credential_count()?,
        "Key registry loaded"
    );
    Ok(Arc::new(RegistryService::new(Arc::new(store), ids)))
}

/// The lock lives next to the registry it guards, so every process opening
/// the same data directory contends on the same file.
fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOCK_FILE)
}

fn open_lock_file(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?)
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    init_tracing(cfg.verbose);
    match cfg.command.clone() {
        None => serve(cfg, ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(cfg, args).await,
        Some(Command::Admin(command)) => admin(cfg, command).await,
    }
}

/// Run the HTTP API and, unless disabled, the operator console on stdin.
pub async fn serve(cfg: Config, args: ServeArgs) -> anyhow::Result<()> {
    tracing::info!("Starting keyward");

    let data_dir = cfg.resolve_data_dir()?;
    diagnostics::check(&cfg, &data_dir, Some(&args))?;

    // Single-instance lock
    let lock_path = lock_path(&data_dir);
    let mut lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
    let _guard = lock
        .try_write()
        .map_err(|_| anyhow::anyhow!("keyward is already running (lock: {})", lock_path.display()))?;

    let registry = open_registry(&data_dir, &cfg.prefix, args.ephemeral)
        .map_err(|e| anyhow::anyhow!("Failed to load key registry: {e}"))?;

    if !args.no_console {
        let console_registry = registry.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = console::run_console(console_registry, stdin, tokio::io::stdout()).await {
                tracing::error!("Console error: {e}");
            }
        });
    }

    let listener = api::bind_listener(&args.listen).await?;
    let state = api::ApiState::new(registry, args.admin_token).with_loader_token(args.loader_token);
    api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await
}

/// One-shot administration against the data directory. Refuses to run while
/// a server owns the registry, since its in-memory copy would go stale.
pub async fn admin(cfg: Config, command: AdminCommand) -> anyhow::Result<()> {
    let data_dir = cfg.resolve_data_dir()?;
    diagnostics::check(&cfg, &data_dir, None)?;

    let lock_path = lock_path(&data_dir);
    let mut lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
    let _guard = lock.try_write().map_err(|_| {
        anyhow::anyhow!(
            "keyward is already running (lock: {}); use its console or HTTP API instead",
            lock_path.display()
        )
    })?;

    let registry = open_registry(&data_dir, &cfg.prefix, false)?;
    let reply = run_admin_command(registry, command).await?;
    println!("{reply}");
    Ok(())
}

async fn run_admin_command(registry: Arc<RegistryService>, command: AdminCommand) -> error::Result<String> {
    let principal = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
    let cmd = command.clone();
    let outcome = tokio::task::spawn_blocking(move || console::execute(&registry, &cmd, &principal, true))
        .await
        .map_err(|e| error::Error::Internal(format!("command task failed: {e}")))?;
    outcome.map_err(|e| error::Error::Internal(console::render_error(&command, &e)))
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logvault::auth::{CredentialFile, Verifier};
use logvault::http::{self, AppState};
use logvault::lifecycle::RotationManager;
use logvault::{LogStore, ServerConfig};
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "logvault")]
#[command(about = "Serve per-user monthly logs and rotate old months into archives")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Storage root directory (overrides config)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Archive compression for new containers: zst, gz or xz (overrides config)
    #[arg(long)]
    compress: Option<String>,

    /// Tab-separated credentials file (overrides config)
    #[arg(long)]
    tsv: Option<PathBuf>,

    /// Days a month stays live before rotation (overrides config)
    #[arg(long)]
    retention_days: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_path(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(storage) = cli.storage {
        config.storage_root = storage;
    }
    if let Some(compress) = cli.compress {
        config.compression = compress;
    }
    if let Some(tsv) = cli.tsv {
        config.credentials = tsv;
    }
    if let Some(days) = cli.retention_days {
        config.retention_days = days;
    }

    let format = config.validate()?;
    let retention = config.retention()?;

    let credentials = CredentialFile::load_or_create(&config.credentials)
        .with_context(|| format!("loading {}", config.credentials.display()))?;
    if credentials.is_empty() {
        log::warn!(
            "no users in {}; add one with logvault-passwd",
            config.credentials.display()
        );
    }
    let verifier: Arc<dyn Verifier> = Arc::new(credentials);

    std::fs::create_dir_all(&config.storage_root)
        .with_context(|| format!("creating {}", config.storage_root.display()))?;
    let store = Arc::new(LogStore::new(&config.storage_root, format)?);
    log::info!(
        "storage at {} (archives: {format}, retention: {} days)",
        config.storage_root.display(),
        config.retention_days
    );

    let manager = Arc::new(RotationManager::new(
        Arc::clone(&store),
        retention,
        config.schedule,
    ));
    let startup = Arc::clone(&manager);
    let report = tokio::task::spawn_blocking(move || startup.sweep(OffsetDateTime::now_utc()))
        .await
        .context("startup rotation sweep")?;
    log::info!("startup rotation sweep: {}", report.summary());
    manager.spawn();

    let app = http::router(AppState::new(store, verifier), config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    log::info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

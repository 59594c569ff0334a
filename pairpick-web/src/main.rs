//! pairpick-web - pairwise preference annotation service
//!
//! Presents a prompt with two candidate outputs, records which one the
//! worker prefers, and appends finished sessions to the judgment log that
//! the sync daemon pushes to the remote dataset repository.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pairpick_common::config::{CliOverrides, Settings, TomlConfig};
use pairpick_web::api::BuildInfo;
use pairpick_web::{build_router, AppContext};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pairpick-web
#[derive(Parser, Debug)]
#[command(name = "pairpick-web")]
#[command(about = "Pairwise preference annotation form")]
#[command(version)]
struct Args {
    /// Corpus source: JSON / JSONL file or http(s) URL
    #[arg(long)]
    corpus: Option<String>,

    /// Directory holding the judgment log (git work tree when syncing)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:7860
    #[arg(long)]
    bind: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal
    let dotenv = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairpick_web=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let build = BuildInfo::current();
    info!(
        "Starting pairpick-web v{} [{}] built {} ({})",
        build.version, build.git_hash, build.build_timestamp, build.build_profile
    );
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let args = Args::parse();
    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration file")?;
    let cli = CliOverrides {
        corpus_source: args.corpus,
        data_dir: args.data_dir,
        bind_addr: args.bind,
    };
    let settings = Settings::resolve(&cli, &toml).context("Invalid configuration")?;
    info!(?settings, "Configuration resolved");

    let context = AppContext::init(settings)
        .await
        .context("Failed to initialize service")?;

    let app = build_router(context.app_state());
    let bind_addr = context.settings().bind_addr.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("pairpick-web listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    context.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

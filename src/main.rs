use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LimiterConfig, TurnstileConfig};
use turnstile::middleware::{HeaderKeyExtractor, RateLimitLayer};
use turnstile::ratelimit::{AdmissionControl, LeakingBucket};

/// Demo server: answers 200 OK to everything the limiter admits.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Turnstile demo server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let extractor = HeaderKeyExtractor::from_name(&config.server.identity_header)?;

    match config.limiter {
        LimiterConfig::LeakingBucket { rate } => {
            let limiter = Arc::new(LeakingBucket::new(rate.into())?);
            info!(capacity = rate.value, interval_ms = rate.interval_ms, "Using leaking bucket");
            serve(config.server.listen_addr, limiter, extractor).await
        }
        LimiterConfig::TokenBucket(token_bucket) => {
            let limiter = Arc::new(token_bucket.into_builder().build()?);
            info!(entries = limiter.entry_count(), "Using token bucket");
            serve(config.server.listen_addr, limiter, extractor).await
        }
    }
}

async fn serve<A>(addr: SocketAddr, limiter: Arc<A>, extractor: HeaderKeyExtractor) -> anyhow::Result<()>
where
    A: AdmissionControl + 'static,
{
    let app = Router::new()
        .fallback(|| async { "OK" })
        .layer(RateLimitLayer::from_shared(limiter.clone()).with_extractor(extractor));

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Listening");

    // Run the server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    limiter.stop();
    limiter.join().await;

    info!("Turnstile demo server stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

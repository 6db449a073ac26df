//! itinerad: the Itinera daemon.
//!
//! Serves the governed itinerary and image clients over HTTP so that
//! several front ends share one set of quota counters.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use itinera::server::config::{Config, Secrets, StoreBackend};
use itinera::server::{AppState, build_router};
use itinera::{Gateway, Itinera, ItineraError, RetryConfig};

/// Itinera daemon, a budget-gated request governor.
#[derive(Parser)]
#[command(name = "itinerad")]
#[command(version = itinera::PKG_VERSION)]
#[command(about = "Itinera request governor daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "ITINERA_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let gateway = Arc::new(build_gateway(&config, &secrets)?);

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| ItineraError::Configuration(format!("Invalid address: {e}")))?;

    let mut state = AppState::new(Arc::clone(&gateway));
    // A remote-backed daemon is a client of another owner; exposing
    // /usage here would proxy to itself.
    if config.store.backend != StoreBackend::Remote {
        state = state.with_usage_store(Arc::clone(gateway.store()));
    }

    info!(version = itinera::version_string(), %addr, store = gateway.store().name(), "itinerad starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("itinerad stopped");
    Ok(())
}

/// Build a [`Gateway`] from configuration.
fn build_gateway(config: &Config, secrets: &Secrets) -> Result<Gateway, ItineraError> {
    let mut builder = Itinera::builder()
        .store(config.store.build()?)
        .models(config.llm.models.clone())
        .llm_quota(config.llm.quota_policy())
        .image_quota(config.images.quota_policy())
        .generation(config.llm.generation.clone())
        .image_cache(config.images.cache_config())
        .default_image_limit(config.images.default_limit)
        .timeout(config.request_timeout());

    match secrets.api_key("gemini") {
        Some(key) => {
            builder = builder.gemini(key);
            if let Some(url) = &config.llm.base_url {
                builder = builder.gemini_base_url(url);
            }
        }
        None => warn!("no Gemini API key configured, itinerary generation disabled"),
    }

    match secrets.api_key("freepik") {
        Some(key) => {
            builder = builder.freepik(key);
            if let Some(url) = &config.images.base_url {
                builder = builder.freepik_base_url(url);
            }
        }
        None => warn!("no Freepik API key configured, image search disabled"),
    }

    if let Some(retry) = &config.llm.retry {
        builder = builder.retry(RetryConfig::from(retry));
    }

    builder.build()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

//! stakeboard - staking leaderboard server
//!
//! Reconstructs vault stake balances from chain reads, ranks the top stakers
//! and serves the result over HTTP behind a TTL cache.

use anyhow::{Context, Result};
use clap::Parser;
use stakeboard::cache::{CacheBackend, MemoryCache, SnapshotCache, UpstashCache};
use stakeboard::config::{Args, CacheChoice};
use stakeboard::leaderboard::LeaderboardBuilder;
use stakeboard::reconstruct::build_reconstructor;
use stakeboard::rpc::RpcClient;
use stakeboard::server::{self, AppState};
use stakeboard::service::LeaderboardService;
use stakeboard::status::PROBE_TIMEOUT;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Args::parse().into_settings()?;

    info!("Starting staking leaderboard server");
    info!("Vault: {}", settings.enumeration.vault);
    info!("Strategy: {:?}", settings.strategy);
    info!("RPC endpoints: {}", settings.endpoints.join(", "));

    let rpc = RpcClient::new(settings.endpoints.clone(), settings.rpc_timeout)
        .context("Failed to create RPC client")?;

    match rpc.chain_id().await {
        Ok(id) if id == settings.chain_id => info!("Connected to chain {}", id),
        Ok(id) => warn!(
            "RPC reports chain id {} but {} is configured; reads may target the wrong network",
            id, settings.chain_id
        ),
        Err(e) => warn!("Could not verify chain id at startup: {}", e),
    }

    let cache = match &settings.cache {
        CacheChoice::Upstash { url, token } => {
            let backend: Arc<dyn CacheBackend> = Arc::new(
                UpstashCache::new(url.clone(), token.clone())
                    .context("Failed to create Upstash client")?,
            );
            SnapshotCache::new(backend)
        }
        CacheChoice::Memory => SnapshotCache::new(Arc::new(MemoryCache::new())),
        CacheChoice::Disabled => {
            warn!("No cache configured; every request reconstructs from chain");
            SnapshotCache::disabled()
        }
    };
    info!("Cache: {} (key {})", cache.backend_name(), settings.service.cache_key);

    let reconstructor = build_reconstructor(
        settings.strategy,
        settings.enumeration.clone(),
        settings.replay.clone(),
    );
    let builder = LeaderboardBuilder::new(settings.top_n).with_staking_token(settings.staking_token);

    let endpoints = Arc::new(rpc.endpoints().to_vec());
    let service = LeaderboardService::new(
        Arc::new(rpc),
        reconstructor,
        builder,
        cache,
        settings.service.clone(),
    );

    let status_client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .context("Failed to create status client")?;

    let state = AppState {
        service: Arc::new(service),
        endpoints,
        status_client,
    };

    server::serve(state, settings.listen).await?;

    info!("Server stopped");
    Ok(())
}

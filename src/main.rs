mod api;
mod cache;
mod config;
mod engine;
mod error;
mod gateway;
mod keywords;
mod keywordtool;
mod scoring;
mod types;
mod usage;
mod youtube;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::cache::CacheContext;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Durable cache tier (optional; memory-only is a supported mode) ---
    let store = match &cfg.cache_db_path {
        Some(path) => match CacheContext::with_sqlite(path).await {
            Ok(store) => {
                info!("Durable cache ready at {path}");
                store
            }
            Err(e) => {
                warn!("Durable cache unavailable ({e}), continuing memory-only");
                CacheContext::memory_only()
            }
        },
        None => CacheContext::memory_only(),
    };

    // --- Engine: caches, ledger, one gateway per provider ---
    let engine = Engine::from_config(&cfg, store)?;
    let status = engine.status();
    if !status.keywordtool_configured {
        warn!("KEYWORDTOOL_API_KEY not set; keyword suggestion endpoints will fail");
    }
    if !status.youtube_configured {
        warn!("YOUTUBE_API_KEY not set; video search endpoints will fail");
    }
    info!(
        youtube = status.youtube_configured,
        keywordtool = status.keywordtool_configured,
        durable_cache = status.durable_cache,
        trends = status.trends_enabled,
        "engine initialized"
    );

    // --- HTTP API server ---
    let app = router(ApiState { engine });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

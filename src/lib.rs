// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod analyze;
pub mod api;
pub mod cache;
pub mod config;
pub mod geo;
pub mod ingest;
pub mod metrics;
pub mod search;

pub use crate::api::{router, AppState};
pub use crate::search::{CacheStatus, SearchRequest, SearchResponse, SearchService};

use axum::Router;

/// Full in-process app: `/health`, `/search` and `/metrics`, built from the
/// default config resolution and the process-wide result cache.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = crate::config::AppConfig::load_default()?;
    let ttl = cfg.search.cache_ttl();
    let service = SearchService::from_config(&cfg, crate::search::global_cache(ttl))?;
    let metrics = crate::metrics::Metrics::init(ttl)?;
    Ok(router(AppState::new(service)).merge(metrics.router()))
}

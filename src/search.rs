//! # Search Service
//! One request end to end: cache lookup, fetch, reconcile, dedup, rank, cache fill.
//!
//! - Cache hits skip the fetch entirely and are marked `HIT`.
//! - A fresh response is `MISS` when at least one live source confirmed, else `SEEDS`
//!   (the caller is looking at baseline data only).
//! - The pipeline runs on the blocking pool. If it fails the caller still gets the
//!   baseline-only ranking plus an `error` field; nothing here fails closed.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::analyze::{
    process, process_baseline_only, CanonicalRecord, ManagedGroups, PostFilters, Processed,
};
use crate::cache::ResultCache;
use crate::config::AppConfig;
use crate::geo::GeoPoint;
use crate::ingest::ensure_metrics_described;
use crate::ingest::orchestrator::{FetchOutput, Orchestrator, DEADLINE_SOURCE};
use crate::ingest::providers::baseline::BASELINE_SOURCE;
use crate::ingest::providers::{BaselineProvider, LiveHttpProvider};
use crate::ingest::types::{
    FetchContext, LocationHints, SourceError, SourceOutcome, SourceProvider,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, alias = "refresh")]
    pub force_refresh: bool,
    #[serde(default)]
    pub user_location: Option<GeoPoint>,
    #[serde(default)]
    pub location_hints: LocationHints,
    #[serde(default)]
    pub session_type_filter: Option<String>,
    /// 0 = Sunday .. 6 = Saturday
    #[serde(default)]
    pub day_of_week_filter: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Seeds,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Seeds => "SEEDS",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub name: String,
    pub count: usize,
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn ok(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            count,
            status: SourceStatus::Success,
            error: None,
        }
    }

    fn failed(name: &str, err: &SourceError) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            status: SourceStatus::Error,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    pub total_count: usize,
    pub total_raw_count: usize,
    pub sources: Vec<SourceReport>,
    pub search_duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub query: Option<String>,
    /// provider name -> confirmed this fetch
    pub has_live_source: BTreeMap<String, bool>,
    pub cache_status: CacheStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub records: Vec<CanonicalRecord>,
    pub meta: SearchMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the result cache holds: the ranked list before caller post-filters.
#[derive(Debug, Clone)]
pub struct CachedSearch {
    pub records: Vec<CanonicalRecord>,
    pub total_raw: usize,
    pub sources: Vec<SourceReport>,
    pub has_live_source: BTreeMap<String, bool>,
}

pub type SearchCache = ResultCache<CachedSearch>;

/// Process-wide cache. The TTL of the first caller wins.
pub fn global_cache(ttl: Duration) -> Arc<SearchCache> {
    static GLOBAL: OnceLock<Arc<SearchCache>> = OnceLock::new();
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(SearchCache::new(ttl))))
}

/// Reconcile, dedup and rank one fetch. Runs on the blocking pool.
pub type PipelineFn =
    fn(&FetchOutput, &ManagedGroups, Option<&str>, Option<GeoPoint>) -> Processed;

pub struct SearchService {
    orchestrator: Orchestrator,
    registry: Arc<ManagedGroups>,
    cache: Arc<SearchCache>,
    pipeline: PipelineFn,
}

impl SearchService {
    pub fn new(
        orchestrator: Orchestrator,
        registry: ManagedGroups,
        cache: Arc<SearchCache>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            orchestrator,
            registry: Arc::new(registry),
            cache,
            pipeline: process,
        }
    }

    /// Swap the reconciliation step. Used by tests to exercise the degrade path.
    #[doc(hidden)]
    pub fn with_pipeline(mut self, pipeline: PipelineFn) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Build providers and the managed-group registry from config.
    pub fn from_config(cfg: &AppConfig, cache: Arc<SearchCache>) -> Result<Self> {
        let baseline = match &cfg.baseline.path {
            Some(p) => BaselineProvider::from_path(p)?,
            None => BaselineProvider::from_default()?,
        };

        let mut live: Vec<Arc<dyn SourceProvider>> = Vec::with_capacity(cfg.live.len());
        for src in &cfg.live {
            let provider = LiveHttpProvider::from_config(src)
                .with_context(|| format!("building live source {}", src.name))?;
            live.push(Arc::new(provider));
        }

        tracing::info!(
            target: "search",
            baseline = baseline.len(),
            live = live.len(),
            "search service configured"
        );

        let orchestrator = Orchestrator::new(
            baseline,
            live,
            cfg.search.per_source_timeout(),
            cfg.search.deadline(),
        );
        Ok(Self::new(
            orchestrator,
            ManagedGroups::from_sources(&cfg.live),
            cache,
        ))
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }

    pub async fn search(&self, req: SearchRequest) -> SearchResponse {
        let started = Instant::now();
        counter!("listings_search_total").increment(1);

        let query = req
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let caller = req.user_location.filter(GeoPoint::is_known);
        let key = SearchCache::key(query.as_deref(), caller);
        let post = PostFilters {
            session_type: req.session_type_filter.clone(),
            day_of_week: req.day_of_week_filter,
        };

        tracing::debug!(
            target: "search",
            q = %anon_hash(query.as_deref().unwrap_or_default()),
            has_location = caller.is_some(),
            refresh = req.force_refresh,
            "search request"
        );

        if !req.force_refresh {
            if let Some(hit) = self.cache.get(&key) {
                counter!("listings_cache_hits_total").increment(1);
                return finish(&hit, CacheStatus::Hit, &post, query, started, None);
            }
        }
        counter!("listings_cache_misses_total").increment(1);

        let ctx = FetchContext {
            query: query.clone(),
            location: caller,
            hints: req.location_hints,
            force_refresh: req.force_refresh,
        };
        let fetched = Arc::new(self.orchestrator.fetch(&ctx).await);
        let status = if fetched.any_live_confirmed() {
            CacheStatus::Miss
        } else {
            CacheStatus::Seeds
        };
        let sources = source_reports(&fetched);
        let has_live_source = has_live_source(&fetched, &self.orchestrator.live_names());

        match self.run_pipeline(Arc::clone(&fetched), query.clone(), caller).await {
            Ok(processed) => {
                let payload = Arc::new(CachedSearch {
                    records: processed.records,
                    total_raw: processed.total_raw,
                    sources,
                    has_live_source,
                });
                if payload.records.is_empty() {
                    tracing::debug!(target: "cache", "empty result, not cached");
                } else {
                    self.cache.put(&key, Arc::clone(&payload));
                }
                finish(&payload, status, &post, query, started, None)
            }
            Err(e) => {
                let error = format!("{e:#}");
                tracing::error!(
                    target: "search",
                    error = %error,
                    "pipeline failed, serving baseline only"
                );
                let payload =
                    degraded(&fetched, query.as_deref(), caller, sources, has_live_source);
                finish(&payload, status, &post, query, started, Some(error))
            }
        }
    }

    async fn run_pipeline(
        &self,
        fetched: Arc<FetchOutput>,
        query: Option<String>,
        caller: Option<GeoPoint>,
    ) -> Result<Processed> {
        let registry = Arc::clone(&self.registry);
        let pipeline = self.pipeline;
        tokio::task::spawn_blocking(move || {
            pipeline(&fetched, &registry, query.as_deref(), caller)
        })
        .await
        .context("reconciliation pipeline task failed")
    }
}

fn degraded(
    fetched: &FetchOutput,
    query: Option<&str>,
    caller: Option<GeoPoint>,
    sources: Vec<SourceReport>,
    has_live_source: BTreeMap<String, bool>,
) -> CachedSearch {
    let processed = process_baseline_only(fetched, query, caller);
    CachedSearch {
        records: processed.records,
        total_raw: processed.total_raw,
        sources,
        has_live_source,
    }
}

fn finish(
    payload: &CachedSearch,
    status: CacheStatus,
    post: &PostFilters,
    query: Option<String>,
    started: Instant,
    error: Option<String>,
) -> SearchResponse {
    let records = post.apply(&payload.records);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    histogram!("listings_search_ms").record(elapsed_ms as f64);

    tracing::info!(
        target: "search",
        status = status.as_str(),
        results = records.len(),
        raw = payload.total_raw,
        elapsed_ms,
        "search served"
    );

    SearchResponse {
        success: error.is_none(),
        meta: SearchMeta {
            total_count: records.len(),
            total_raw_count: payload.total_raw,
            sources: payload.sources.clone(),
            search_duration_ms: elapsed_ms,
            timestamp: Utc::now(),
            query,
            has_live_source: payload.has_live_source.clone(),
            cache_status: status,
        },
        records,
        error,
    }
}

/// Baseline first, live providers by name, then the deadline marker and
/// every provider it cut off.
pub fn source_reports(fetched: &FetchOutput) -> Vec<SourceReport> {
    let mut out = Vec::with_capacity(fetched.live.len() + 2);
    out.push(SourceReport::ok(BASELINE_SOURCE, fetched.baseline.len()));
    for (name, outcome) in &fetched.live {
        out.push(match outcome {
            SourceOutcome::Confirmed(batch) => SourceReport::ok(name, batch.records.len()),
            SourceOutcome::Unconfirmed(err) => SourceReport::failed(name, err),
        });
    }
    if let Some(err) = &fetched.deadline {
        out.push(SourceReport::failed(DEADLINE_SOURCE, err));
        for name in &fetched.abandoned {
            out.push(SourceReport::failed(name, err));
        }
    }
    out
}

fn has_live_source(fetched: &FetchOutput, providers: &[String]) -> BTreeMap<String, bool> {
    let mut map: BTreeMap<String, bool> = providers.iter().map(|p| (p.clone(), false)).collect();
    for (name, outcome) in &fetched.live {
        map.insert(name.clone(), outcome.is_confirmed());
    }
    map
}

/// Short, stable, non-reversible id for logging queries.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

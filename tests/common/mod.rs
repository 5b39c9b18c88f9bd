// tests/common/mod.rs
// Shared fixtures: scripted providers and an in-process service builder.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rink_listings::analyze::ManagedGroups;
use rink_listings::cache::ResultCache;
use rink_listings::geo::GeoPoint;
use rink_listings::ingest::orchestrator::Orchestrator;
use rink_listings::ingest::providers::BaselineProvider;
use rink_listings::ingest::types::{
    CandidateRecord, FetchContext, SourceError, SourceKind, SourceOutcome, SourceProvider,
};
use rink_listings::SearchService;

pub const SESSION_NAMES: [&str; 10] = [
    "Public Skate",
    "Stick & Puck",
    "Freestyle",
    "Adult Drop-In",
    "Learn to Skate",
    "Open Hockey",
    "Figure Patch",
    "Cosmic Skate",
    "Parent & Tot",
    "Senior Skate",
];

pub fn record(id: &str, group: &str, name: &str, date: &str) -> CandidateRecord {
    CandidateRecord {
        id: id.into(),
        group_key: group.into(),
        name: name.into(),
        location: format!("{group} arena"),
        date: date.into(),
        start_time: Some("10:00".into()),
        end_time: Some("11:00".into()),
        ..Default::default()
    }
}

/// Ten distinct sessions spread over two rinks.
pub fn ten_baseline_records() -> Vec<CandidateRecord> {
    SESSION_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let group = if i % 2 == 0 { "rinkA" } else { "rinkB" };
            record(&format!("b{i}"), group, name, "2026-10-20")
        })
        .collect()
}

pub fn live(mut r: CandidateRecord, provider: &str) -> CandidateRecord {
    r.source = SourceKind::Live(provider.into());
    r
}

/// Provider that sleeps, then answers with a fixed outcome. Counts its calls.
pub struct Scripted {
    pub name: String,
    pub delay: Duration,
    pub outcome: SourceOutcome,
    pub calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl Scripted {
    pub fn new(name: &str, delay_ms: u64, outcome: SourceOutcome) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(delay_ms),
            outcome,
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str, err: SourceError) -> Self {
        Self::new(name, 0, SourceOutcome::Unconfirmed(err))
    }
}

#[async_trait]
impl SourceProvider for Scripted {
    async fn fetch(&self, _ctx: &FetchContext) -> SourceOutcome {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct Harness {
    pub baseline: Vec<CandidateRecord>,
    pub live: Vec<Arc<dyn SourceProvider>>,
    pub registry: ManagedGroups,
    pub per_source: Duration,
    pub deadline: Duration,
    pub ttl: Duration,
}

impl Harness {
    pub fn new(baseline: Vec<CandidateRecord>) -> Self {
        Self {
            baseline,
            live: Vec::new(),
            registry: ManagedGroups::new(),
            per_source: Duration::from_millis(200),
            deadline: Duration::from_millis(2_000),
            ttl: Duration::from_secs(900),
        }
    }

    /// Add a provider and register the groups it manages.
    pub fn with_live(mut self, provider: impl SourceProvider + 'static, groups: &[&str]) -> Self {
        self.registry
            .register(provider.name(), groups.iter().copied());
        self.live.push(Arc::new(provider));
        self
    }

    pub fn timings(mut self, per_source_ms: u64, deadline_ms: u64) -> Self {
        self.per_source = Duration::from_millis(per_source_ms);
        self.deadline = Duration::from_millis(deadline_ms);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> SearchService {
        let orchestrator = Orchestrator::new(
            BaselineProvider::new(self.baseline),
            self.live,
            self.per_source,
            self.deadline,
        );
        SearchService::new(
            orchestrator,
            self.registry,
            Arc::new(ResultCache::new(self.ttl)),
        )
    }
}

pub const MINNEAPOLIS: GeoPoint = GeoPoint {
    lat: 44.9778,
    lng: -93.2650,
};

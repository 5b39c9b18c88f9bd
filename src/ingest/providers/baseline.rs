// src/ingest/providers/baseline.rs
use anyhow::Result;
use async_trait::async_trait;

use crate::ingest::config::{load_baseline_default, load_baseline_from};
use crate::ingest::types::{CandidateRecord, FetchContext, SourceOutcome, SourceProvider};
use crate::ingest::validate_records;

pub const BASELINE_SOURCE: &str = "baseline";

/// Local, curated dataset. Always answers, always confirmed.
#[derive(Debug, Clone, Default)]
pub struct BaselineProvider {
    records: Vec<CandidateRecord>,
}

impl BaselineProvider {
    /// Validates once up front so every request sees the same clean set.
    pub fn new(raw: Vec<CandidateRecord>) -> Self {
        let (records, dropped) = validate_records(BASELINE_SOURCE, raw);
        if dropped > 0 {
            tracing::warn!(target: "ingest", dropped, "baseline contained malformed records");
        }
        Self { records }
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        Ok(Self::new(load_baseline_from(path)?))
    }

    /// `$LISTINGS_BASELINE_PATH`, `config/baseline.json`, else the embedded seed.
    pub fn from_default() -> Result<Self> {
        Ok(Self::new(load_baseline_default()?))
    }

    /// Synchronous, cheap: a clone of the validated seed.
    pub fn load(&self) -> Vec<CandidateRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SourceProvider for BaselineProvider {
    async fn fetch(&self, _ctx: &FetchContext) -> SourceOutcome {
        SourceOutcome::confirmed(self.load())
    }

    fn name(&self) -> &str {
        BASELINE_SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn baseline_is_always_confirmed() {
        let p = BaselineProvider::new(vec![CandidateRecord {
            id: "a".into(),
            group_key: "rinkA".into(),
            name: "Public Skate".into(),
            date: "2026-10-20".into(),
            ..Default::default()
        }]);
        let out = p.fetch(&FetchContext::default()).await;
        assert!(out.is_confirmed());
        assert_eq!(out.record_count(), 1);
    }

    #[test]
    fn malformed_seed_rows_are_dropped() {
        let p = BaselineProvider::new(vec![CandidateRecord {
            id: "bad".into(),
            name: "No group".into(),
            date: "2026-10-20".into(),
            ..Default::default()
        }]);
        assert!(p.is_empty());
    }
}

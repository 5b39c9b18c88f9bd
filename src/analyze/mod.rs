//! Reconciliation pipeline: precedence -> dedup -> query filter -> score & rank.
//! Pure and synchronous; the search service runs it off the async executor.

pub mod dedup;
pub mod filter;
pub mod reconcile;
pub mod scoring;

use crate::geo::GeoPoint;
use crate::ingest::orchestrator::FetchOutput;

// Re-export convenient types.
pub use crate::analyze::dedup::dedup;
pub use crate::analyze::filter::{filter_by_query, PostFilters};
pub use crate::analyze::reconcile::{reconcile, ConfirmationMap, ManagedGroups};
pub use crate::analyze::scoring::{rank, score_record, CanonicalRecord};

/// Output of one pipeline run, before caller post-filters.
#[derive(Debug, Clone)]
pub struct Processed {
    pub records: Vec<CanonicalRecord>,
    /// Candidate records fetched (baseline + confirmed live) before any step.
    pub total_raw: usize,
}

/// Run every step on one fetch cycle's output.
pub fn process(
    fetched: &FetchOutput,
    registry: &ManagedGroups,
    query: Option<&str>,
    caller: Option<GeoPoint>,
) -> Processed {
    let live = reconcile::live_records(&fetched.live);
    let total_raw = fetched.baseline.len() + live.len();

    let confirmations = ConfirmationMap::from_outcomes(registry, &fetched.live);
    let reconciled = reconcile(fetched.baseline.clone(), live, registry, &confirmations);
    let unique = dedup(reconciled);
    let matched = filter_by_query(unique, query);

    Processed {
        records: rank(matched, caller),
        total_raw,
    }
}

/// Baseline-only degradation path: no reconciliation, still deduped and ranked.
pub fn process_baseline_only(
    fetched: &FetchOutput,
    query: Option<&str>,
    caller: Option<GeoPoint>,
) -> Processed {
    let matched = filter_by_query(dedup(fetched.baseline.clone()), query);
    Processed {
        total_raw: fetched.baseline.len(),
        records: rank(matched, caller),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{CandidateRecord, SourceError, SourceKind, SourceOutcome};

    fn rec(id: &str, group: &str, name: &str, source: SourceKind) -> CandidateRecord {
        CandidateRecord {
            id: id.into(),
            group_key: group.into(),
            name: name.into(),
            location: format!("{group} arena"),
            date: "2026-10-20".into(),
            source,
            ..Default::default()
        }
    }

    fn fetched(live: Vec<(String, SourceOutcome)>) -> FetchOutput {
        FetchOutput {
            baseline: vec![
                rec("b1", "rinkA", "Public Skate", SourceKind::Baseline),
                rec("b2", "rinkB", "Goalie Clinic", SourceKind::Baseline),
            ],
            live,
            deadline: None,
            abandoned: vec![],
        }
    }

    #[test]
    fn live_confirmation_replaces_managed_group_only() {
        let mut reg = ManagedGroups::new();
        reg.register("ds", ["rinkA"]);
        let live = vec![(
            "ds".to_string(),
            SourceOutcome::confirmed(vec![rec(
                "l1",
                "rinkA",
                "Stick & Puck",
                SourceKind::Live("ds".into()),
            )]),
        )];
        let out = process(&fetched(live), &reg, None, None);
        let mut ids: Vec<&str> = out.records.iter().map(|c| c.record.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["b2", "l1"]);
        assert_eq!(out.total_raw, 3);
    }

    #[test]
    fn failed_live_source_leaves_baseline_intact() {
        let mut reg = ManagedGroups::new();
        reg.register("ds", ["rinkA"]);
        let live = vec![(
            "ds".to_string(),
            SourceOutcome::Unconfirmed(SourceError::Http(500)),
        )];
        let out = process(&fetched(live), &reg, Some("skate clinic"), None);
        assert_eq!(out.records.len(), 2);
    }

    #[test]
    fn baseline_only_path_ignores_live() {
        let live = vec![(
            "ds".to_string(),
            SourceOutcome::confirmed(vec![rec("l1", "rinkA", "X", SourceKind::Live("ds".into()))]),
        )];
        let out = process_baseline_only(&fetched(live), Some("goalie"), None);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].record.id, "b2");
    }
}

//! Reconciliation: decides, per group, whether live data supersedes baseline data.
//!
//! Baseline records for a group are dropped only when the group is live-managed
//! AND a managing source confirmed this fetch. An error or timeout never hides
//! baseline data. Live records always pass through.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::LiveSourceConfig;
use crate::ingest::types::{CandidateRecord, Scope, SourceOutcome};

/// Explicit registry of which live sources are authoritative for which groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedGroups {
    /// group -> managing sources
    by_group: BTreeMap<String, BTreeSet<String>>,
}

impl ManagedGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sources(sources: &[LiveSourceConfig]) -> Self {
        let mut reg = Self::new();
        for s in sources {
            reg.register(&s.name, s.groups.iter().map(String::as_str));
        }
        reg
    }

    pub fn register<'a>(&mut self, source: &str, groups: impl IntoIterator<Item = &'a str>) {
        for g in groups {
            let g = g.trim();
            if g.is_empty() {
                continue;
            }
            self.by_group
                .entry(g.to_string())
                .or_default()
                .insert(source.to_string());
        }
    }

    pub fn is_managed(&self, group: &str) -> bool {
        self.by_group.contains_key(group)
    }

    pub fn manages(&self, source: &str, group: &str) -> bool {
        self.by_group
            .get(group)
            .is_some_and(|sources| sources.contains(source))
    }

    pub fn groups_of<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_group
            .iter()
            .filter(move |(_, sources)| sources.contains(source))
            .map(|(g, _)| g.as_str())
    }
}

/// Per-group confirmation for one fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationMap(BTreeMap<String, bool>);

impl ConfirmationMap {
    /// Every managed group starts unconfirmed; a confirmed outcome flips the groups
    /// in its scope. A group managed by several sources needs only one confirmation.
    pub fn from_outcomes(registry: &ManagedGroups, outcomes: &[(String, SourceOutcome)]) -> Self {
        let mut map: BTreeMap<String, bool> = registry
            .by_group
            .keys()
            .map(|g| (g.clone(), false))
            .collect();

        for (source, outcome) in outcomes {
            let SourceOutcome::Confirmed(batch) = outcome else {
                continue;
            };
            match &batch.scope {
                Scope::AllManaged => {
                    for g in registry.groups_of(source) {
                        map.insert(g.to_string(), true);
                    }
                }
                Scope::Groups(groups) => {
                    for g in groups.iter().filter(|g| registry.manages(source, g)) {
                        map.insert(g.clone(), true);
                    }
                }
            }
        }
        Self(map)
    }

    pub fn set(&mut self, group: &str, confirmed: bool) {
        self.0.insert(group.to_string(), confirmed);
    }

    pub fn is_confirmed(&self, group: &str) -> bool {
        self.0.get(group).copied().unwrap_or(false)
    }
}

/// Merge baseline and live records under the precedence rule.
pub fn reconcile(
    baseline: Vec<CandidateRecord>,
    live: Vec<CandidateRecord>,
    registry: &ManagedGroups,
    confirmations: &ConfirmationMap,
) -> Vec<CandidateRecord> {
    let before = baseline.len();
    let mut out: Vec<CandidateRecord> = baseline
        .into_iter()
        .filter(|r| {
            !(registry.is_managed(&r.group_key) && confirmations.is_confirmed(&r.group_key))
        })
        .collect();
    let superseded = before - out.len();
    if superseded > 0 {
        tracing::debug!(target: "search", superseded, "baseline records superseded by live data");
    }
    out.extend(live);
    out
}

/// Flatten confirmed live outcomes into one record list.
pub fn live_records(outcomes: &[(String, SourceOutcome)]) -> Vec<CandidateRecord> {
    outcomes
        .iter()
        .filter_map(|(_, o)| match o {
            SourceOutcome::Confirmed(b) => Some(b.records.iter().cloned()),
            SourceOutcome::Unconfirmed(_) => None,
        })
        .flatten()
        .collect()
}

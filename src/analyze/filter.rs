//! Request filters.
//!
//! The free-text prefilter runs before scoring: a record stays when any
//! whitespace-delimited query token is a substring of its searchable text.
//! Session-type and day-of-week filters run on the ranked list (after the cache),
//! and ranks are reassigned.

use crate::analyze::scoring::{assign_ranks, CanonicalRecord};
use crate::ingest::types::CandidateRecord;

/// Lowercased tokens of the query; empty when there is nothing to filter on.
pub fn query_tokens(query: Option<&str>) -> Vec<String> {
    query
        .map(|q| q.to_lowercase().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn haystack(r: &CandidateRecord) -> String {
    let mut parts: Vec<&str> = vec![r.name.as_str(), r.description.as_str(), r.location.as_str()];
    if let Some(c) = r.city.as_deref() {
        parts.push(c);
    }
    if let Some(s) = r.state.as_deref() {
        parts.push(s);
    }
    parts.extend(r.tags.iter().map(String::as_str));
    parts.join(" ").to_lowercase()
}

pub fn matches_query(r: &CandidateRecord, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return true;
    }
    let hay = haystack(r);
    tokens.iter().any(|t| hay.contains(t.as_str()))
}

pub fn filter_by_query(records: Vec<CandidateRecord>, query: Option<&str>) -> Vec<CandidateRecord> {
    let tokens = query_tokens(query);
    if tokens.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| matches_query(r, &tokens))
        .collect()
}

/// Optional caller filters applied to an already ranked list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilters {
    pub session_type: Option<String>,
    pub day_of_week: Option<u8>,
}

impl PostFilters {
    pub fn is_empty(&self) -> bool {
        self.session_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .is_none()
            && self.day_of_week.is_none()
    }

    fn keeps(&self, r: &CandidateRecord) -> bool {
        let type_ok = match self.session_type.as_deref().map(str::trim) {
            Some(want) if !want.is_empty() => r
                .session_type
                .as_deref()
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(want)),
            _ => true,
        };
        let day_ok = self.day_of_week.map_or(true, |d| r.day_of_week == Some(d));
        type_ok && day_ok
    }

    pub fn apply(&self, records: &[CanonicalRecord]) -> Vec<CanonicalRecord> {
        if self.is_empty() {
            return records.to_vec();
        }
        let mut out: Vec<CanonicalRecord> = records
            .iter()
            .filter(|c| self.keeps(&c.record))
            .cloned()
            .collect();
        assign_ranks(&mut out);
        out
    }
}

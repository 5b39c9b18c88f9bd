// src/ingest/types.rs
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::geo::GeoPoint;

/// Where a record came from. Serialized as `"baseline"` or `"live:<provider>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SourceKind {
    #[default]
    Baseline,
    Live(String),
}

impl SourceKind {
    pub fn is_live(&self) -> bool {
        matches!(self, SourceKind::Live(_))
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            SourceKind::Baseline => None,
            SourceKind::Live(name) => Some(name.as_str()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Baseline => f.write_str("baseline"),
            SourceKind::Live(name) => write!(f, "live:{name}"),
        }
    }
}

impl Serialize for SourceKind {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(match raw.strip_prefix("live:") {
            Some(name) => SourceKind::Live(name.to_string()),
            None => SourceKind::Baseline,
        })
    }
}

/// One listing from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: String,
    #[serde(default)]
    pub group_key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
    /// ISO `YYYY-MM-DD`; validated by `ingest::validate_records`.
    #[serde(default)]
    pub date: String,
    /// `HH:MM`, 24h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// 0 = Sunday .. 6 = Saturday
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spots_remaining: Option<u32>,
    #[serde(default)]
    pub promoted: bool,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
}

impl CandidateRecord {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").ok()
    }

    /// Session window in minutes since midnight. Missing times cover the whole day.
    pub fn window_minutes(&self) -> (u32, u32) {
        let start = self.start_time.as_deref().and_then(parse_hhmm).unwrap_or(0);
        let end = self
            .end_time
            .as_deref()
            .and_then(parse_hhmm)
            .filter(|e| *e > start)
            .unwrap_or(24 * 60);
        (start, end)
    }

    /// Sort key for "earliest first": date then start time.
    pub fn start_key(&self) -> (&str, u32) {
        (self.date.as_str(), self.window_minutes().0)
    }

    /// Known coordinates, if the record carries usable ones.
    pub fn point(&self) -> Option<GeoPoint> {
        self.coordinates.filter(GeoPoint::is_known)
    }
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.get(..2).unwrap_or(m).parse().ok()?;
    (h <= 24 && m < 60).then_some(h * 60 + m)
}

/// Why a source contributed nothing this fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("global deadline of {0} ms exceeded")]
    Deadline(u64),
    #[error("http status {0}")]
    Http(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("task failed: {0}")]
    Panicked(String),
}

/// Which groups a confirmed answer speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// Every group the source manages in the registry.
    #[default]
    AllManaged,
    /// Only these groups (e.g. a per-venue fetch that partially succeeded).
    Groups(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfirmedBatch {
    pub records: Vec<CandidateRecord>,
    pub scope: Scope,
}

/// Output of one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    /// The source definitively answered for its scope, possibly with zero records.
    Confirmed(ConfirmedBatch),
    /// Error, timeout or not attempted.
    Unconfirmed(SourceError),
}

impl SourceOutcome {
    pub fn confirmed(records: Vec<CandidateRecord>) -> Self {
        SourceOutcome::Confirmed(ConfirmedBatch {
            records,
            scope: Scope::AllManaged,
        })
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SourceOutcome::Confirmed(_))
    }

    pub fn record_count(&self) -> usize {
        match self {
            SourceOutcome::Confirmed(b) => b.records.len(),
            SourceOutcome::Unconfirmed(_) => 0,
        }
    }
}

/// Caller context handed to every adapter.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    pub query: Option<String>,
    pub location: Option<GeoPoint>,
    pub hints: LocationHints,
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch(&self, ctx: &FetchContext) -> SourceOutcome;
    fn name(&self) -> &str;
}

//! Relevance scoring and ranking.
//!
//! `score` is a sum of independent signals:
//! - distance tier (miles) when both sides have coordinates, else a flat +15
//! - promotion +15, rating >= 4.5 +10 (>= 4.0 +5), reviews > 50 +5, new +5
//! - promoted AND rating >= 4.7 AND reviews > 100: another +20
//!
//! Ranking is a total order: score desc, earliest start, nearer first (records
//! without a distance after those with one), then id and source.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geo::{distance_miles, GeoPoint};
use crate::ingest::types::CandidateRecord;

/// A deduplicated, scored record. Not mutated after ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    #[serde(flatten)]
    pub record: CandidateRecord,
    pub score: u32,
    pub rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

fn distance_points(miles: f64) -> u32 {
    if miles < 50.0 {
        50
    } else if miles < 150.0 {
        40
    } else if miles < 500.0 {
        30
    } else if miles < 2_000.0 {
        20
    } else {
        5
    }
}

/// Pure: same record + same caller location gives the same (score, distance).
pub fn score_record(r: &CandidateRecord, caller: Option<GeoPoint>) -> (u32, Option<f64>) {
    let mut score = 0u32;

    let distance = match (caller.filter(GeoPoint::is_known), r.point()) {
        (Some(me), Some(there)) => Some(distance_miles(me, there)),
        _ => None,
    };
    score += distance.map(distance_points).unwrap_or(15);

    let rating = r.rating.unwrap_or(0.0);
    if r.promoted {
        score += 15;
    }
    if rating >= 4.5 {
        score += 10;
    } else if rating >= 4.0 {
        score += 5;
    }
    if r.review_count > 50 {
        score += 5;
    }
    if r.is_new {
        score += 5;
    }
    if r.promoted && rating >= 4.7 && r.review_count > 100 {
        score += 20;
    }

    (score, distance)
}

/// Known distances first, nearest first; unknown distances sort after all known ones.
fn distance_order(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(da), Some(db)) => da.total_cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ranking comparator over already-scored records.
pub fn rank_order(a: &CanonicalRecord, b: &CanonicalRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.record.start_key().cmp(&b.record.start_key()))
        .then_with(|| distance_order(a.distance, b.distance))
        .then_with(|| a.record.id.cmp(&b.record.id))
        .then_with(|| a.record.source.cmp(&b.record.source))
}

/// Score, sort and assign 1-based ranks. Never truncates.
pub fn rank(records: Vec<CandidateRecord>, caller: Option<GeoPoint>) -> Vec<CanonicalRecord> {
    let mut scored: Vec<CanonicalRecord> = records
        .into_iter()
        .map(|record| {
            let (score, distance) = score_record(&record, caller);
            CanonicalRecord {
                record,
                score,
                rank: 0,
                distance,
            }
        })
        .collect();
    scored.sort_by(rank_order);
    assign_ranks(&mut scored);
    scored
}

pub(crate) fn assign_ranks(records: &mut [CanonicalRecord]) {
    for (i, r) in records.iter_mut().enumerate() {
        r.rank = i as u32 + 1;
    }
}

//! Cross-source deduplication.
//!
//! Two records are the same entity when all of these hold:
//! - their normalized names match and they fall on the same date,
//! - their time windows overlap (a missing time covers the whole day),
//! - they are at the same place. Coordinates within `SAME_PLACE_MILES` when both have
//!   them, else equal normalized location text, else equal city, else equal group key.
//!
//! Duplicates are grouped as connected components of that relation, so the result
//! does not depend on input order, and running it on its own output is a no-op.
//! One survivor per component, chosen by `survivor_order`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use metrics::counter;

use crate::geo::distance_miles;
use crate::ingest::match_key;
use crate::ingest::types::CandidateRecord;

/// About 400 m: same building or parking lot.
pub const SAME_PLACE_MILES: f64 = 0.25;

struct Keyed {
    rec: CandidateRecord,
    location: String,
    city: String,
    window: (u32, u32),
}

impl Keyed {
    fn new(rec: CandidateRecord) -> Self {
        Self {
            location: match_key(&rec.location),
            city: rec.city.as_deref().map(match_key).unwrap_or_default(),
            window: rec.window_minutes(),
            rec,
        }
    }
}

fn same_place(a: &Keyed, b: &Keyed) -> bool {
    if let (Some(pa), Some(pb)) = (a.rec.point(), b.rec.point()) {
        return distance_miles(pa, pb) <= SAME_PLACE_MILES;
    }
    if !a.location.is_empty() && !b.location.is_empty() {
        return a.location == b.location;
    }
    if !a.city.is_empty() && !b.city.is_empty() {
        return a.city == b.city;
    }
    a.rec.group_key == b.rec.group_key
}

fn overlaps(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

fn is_duplicate(a: &Keyed, b: &Keyed) -> bool {
    overlaps(a.window, b.window) && same_place(a, b)
}

/// Survivor preference: live over baseline, then longer description, then
/// lexicographically smaller id. Remaining fields only break exact ties.
pub fn survivor_order(a: &CandidateRecord, b: &CandidateRecord) -> Ordering {
    b.source
        .is_live()
        .cmp(&a.source.is_live())
        .then_with(|| b.description.chars().count().cmp(&a.description.chars().count()))
        .then_with(|| a.id.cmp(&b.id))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.start_key().cmp(&b.start_key()))
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // smaller root wins so the structure is independent of visit order
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

/// Collapse duplicates to one canonical record each. Output is sorted by
/// (date, start time, id) so callers see a stable sequence.
pub fn dedup(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let input_len = records.len();

    // bucket by (normalized name, date); duplicates never cross buckets
    let mut buckets: BTreeMap<(String, String), Vec<Keyed>> = BTreeMap::new();
    for rec in records {
        let key = (match_key(&rec.name), rec.date.clone());
        buckets.entry(key).or_default().push(Keyed::new(rec));
    }

    let mut out = Vec::with_capacity(input_len);
    for (_, mut bucket) in buckets {
        // canonical order first: union-find roots then only depend on content
        bucket.sort_by(|a, b| survivor_order(&a.rec, &b.rec));

        let n = bucket.len();
        let mut parent: Vec<usize> = (0..n).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                if is_duplicate(&bucket[i], &bucket[j]) {
                    union(&mut parent, i, j);
                }
            }
        }

        // bucket is sorted by preference, so the first member seen per root survives
        let mut seen_roots = vec![false; n];
        for (i, k) in bucket.into_iter().enumerate() {
            let root = find(&mut parent, i);
            if !seen_roots[root] {
                seen_roots[root] = true;
                out.push(k.rec);
            }
        }
    }

    out.sort_by(|a, b| {
        a.start_key()
            .cmp(&b.start_key())
            .then_with(|| a.id.cmp(&b.id))
            .then_with(|| a.source.cmp(&b.source))
    });

    let removed = input_len - out.len();
    if removed > 0 {
        counter!("listings_dedup_removed_total").increment(removed as u64);
        tracing::debug!(target: "search", removed, kept = out.len(), "deduplicated records");
    }
    out
}

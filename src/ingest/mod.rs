// src/ingest/mod.rs
pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod types;

use crate::ingest::types::CandidateRecord;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("listings_search_total", "Search requests handled.");
        describe_counter!("listings_cache_hits_total", "Searches answered from cache.");
        describe_counter!(
            "listings_cache_misses_total",
            "Searches that ran the full pipeline."
        );
        describe_counter!(
            "listings_source_errors_total",
            "Live source failures (error, timeout, deadline)."
        );
        describe_counter!(
            "listings_records_dropped_total",
            "Records dropped by validation."
        );
        describe_counter!(
            "listings_dedup_removed_total",
            "Records collapsed by deduplication."
        );
        describe_histogram!("listings_search_ms", "End-to-end search time in milliseconds.");
        describe_gauge!("listings_cache_ttl_ms", "Configured result cache TTL.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Matching key for free text: normalized, lowercased, punctuation dropped.
pub fn match_key(s: &str) -> String {
    let text = normalize_text(s).to_lowercase();
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if ch.is_whitespace() && !out.ends_with(' ') {
            out.push(' ');
        } else if !ch.is_whitespace() && !out.is_empty() && !out.ends_with(' ') {
            // "stick&puck" and "stick & puck" should agree
            out.push(' ');
        }
    }
    out.trim().to_string()
}

/// Drop records missing the fields the pipeline relies on (`groupKey`, a parseable
/// `date`), cleaning text fields of the survivors. Returns (kept, dropped_count).
pub fn validate_records(source: &str, raw: Vec<CandidateRecord>) -> (Vec<CandidateRecord>, usize) {
    let mut kept = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for mut rec in raw {
        let reason = if rec.group_key.trim().is_empty() {
            Some("missing groupKey")
        } else if rec.parsed_date().is_none() {
            Some("missing or malformed date")
        } else if rec.id.trim().is_empty() {
            Some("missing id")
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::warn!(target: "ingest", source, id = %rec.id, reason, "dropping record");
            dropped += 1;
            continue;
        }

        rec.group_key = rec.group_key.trim().to_string();
        rec.date = rec.date.trim().to_string();
        rec.name = normalize_text(&rec.name);
        rec.description = normalize_text(&rec.description);
        rec.location = normalize_text(&rec.location);
        if rec.day_of_week.is_none() {
            rec.day_of_week = rec.parsed_date().map(|d| {
                use chrono::Datelike;
                d.weekday().num_days_from_sunday() as u8
            });
        }
        kept.push(rec);
    }

    if dropped > 0 {
        counter!("listings_records_dropped_total").increment(dropped as u64);
    }
    (kept, dropped)
}

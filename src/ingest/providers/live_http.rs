// src/ingest/providers/live_http.rs
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::config::LiveSourceConfig;
use crate::ingest::types::{
    CandidateRecord, ConfirmedBatch, FetchContext, Scope, SourceError, SourceKind, SourceOutcome,
    SourceProvider,
};
use crate::ingest::validate_records;

/// Wire shape of one page. Records stay loosely typed so one bad row does not
/// sink the page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    records: Vec<serde_json::Value>,
    /// Groups this answer is authoritative for; absent means "all I manage".
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    has_more: Option<bool>,
}

/// Generic JSON provider: paginates, caches raw pages for a short TTL, and
/// normalizes into `CandidateRecord`s stamped `live:<name>`.
pub struct LiveHttpProvider {
    name: String,
    mode: Mode,
    page_size: u32,
    max_pages: u32,
    responses: ResponseCache,
}

enum Mode {
    /// In-memory body, used for tests and local runs.
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl LiveHttpProvider {
    pub fn from_config(cfg: &LiveSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("rink-listings/0.1")
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            name: cfg.name.clone(),
            mode: Mode::Http {
                url: cfg.url.clone(),
                client,
            },
            page_size: cfg.page_size.max(1),
            max_pages: cfg.max_pages.max(1),
            responses: ResponseCache::new(Duration::from_secs(cfg.response_ttl_secs)),
        })
    }

    pub fn from_fixture_str(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(body.to_string()),
            page_size: u32::MAX,
            max_pages: 1,
            responses: ResponseCache::new(Duration::ZERO),
        }
    }

    async fn fetch_all(&self, ctx: &FetchContext) -> Result<ConfirmedBatch, SourceError> {
        let mut records = Vec::new();
        let mut groups: Option<BTreeSet<String>> = None;

        for page_no in 1..=self.max_pages {
            let body = self.page_body(ctx, page_no).await?;
            let page: Page =
                serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))?;

            let got = page.records.len();
            records.extend(self.decode_records(page.records));
            if let Some(g) = page.groups {
                groups
                    .get_or_insert_with(BTreeSet::new)
                    .extend(g.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
            }

            let short_page = (got as u64) < u64::from(self.page_size);
            if page.has_more == Some(false) || (page.has_more.is_none() && short_page) {
                break;
            }
        }

        let (records, _dropped) = validate_records(&self.name, records);
        Ok(ConfirmedBatch {
            records,
            scope: groups.map(Scope::Groups).unwrap_or_default(),
        })
    }

    fn decode_records(&self, raw: Vec<serde_json::Value>) -> Vec<CandidateRecord> {
        raw.into_iter()
            .filter_map(|v| match serde_json::from_value::<CandidateRecord>(v) {
                Ok(mut r) => {
                    r.source = SourceKind::Live(self.name.clone());
                    Some(r)
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        provider = %self.name,
                        error = %e,
                        "skipping undecodable record"
                    );
                    counter!("listings_records_dropped_total").increment(1);
                    None
                }
            })
            .collect()
    }

    async fn page_body(&self, ctx: &FetchContext, page_no: u32) -> Result<String, SourceError> {
        match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { url, client } => {
                let full = build_url(url, ctx, page_no, self.page_size)?;
                if !ctx.force_refresh {
                    if let Some(hit) = self.responses.get(&full) {
                        return Ok(hit);
                    }
                }

                let resp = client
                    .get(&full)
                    .send()
                    .await
                    .map_err(|e| SourceError::Transport(e.to_string()))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(SourceError::Http(status.as_u16()));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| SourceError::Transport(e.to_string()))?;
                self.responses.put(full, body.clone());
                Ok(body)
            }
        }
    }
}

fn build_url(
    base: &str,
    ctx: &FetchContext,
    page_no: u32,
    page_size: u32,
) -> Result<String, SourceError> {
    let mut params: Vec<(&str, String)> = vec![
        ("page", page_no.to_string()),
        ("pageSize", page_size.to_string()),
    ];
    if let Some(q) = ctx.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        params.push(("q", q.to_string()));
    }
    if let Some(p) = ctx.location {
        params.push(("lat", format!("{:.4}", p.lat)));
        params.push(("lng", format!("{:.4}", p.lng)));
    }
    for (k, v) in [
        ("city", &ctx.hints.city),
        ("state", &ctx.hints.state),
        ("country", &ctx.hints.country),
    ] {
        if let Some(v) = v.as_deref().filter(|v| !v.trim().is_empty()) {
            params.push((k, v.trim().to_string()));
        }
    }
    reqwest::Url::parse_with_params(base, &params)
        .map(|u| u.to_string())
        .map_err(|e| SourceError::Transport(format!("bad url {base}: {e}")))
}

#[async_trait]
impl SourceProvider for LiveHttpProvider {
    async fn fetch(&self, ctx: &FetchContext) -> SourceOutcome {
        match self.fetch_all(ctx).await {
            Ok(batch) => {
                tracing::debug!(
                    target: "ingest",
                    provider = %self.name,
                    records = batch.records.len(),
                    "live source confirmed"
                );
                SourceOutcome::Confirmed(batch)
            }
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    provider = %self.name,
                    error = %e,
                    "live source failed"
                );
                SourceOutcome::Unconfirmed(e)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Raw page cache keyed by full request URL. Lazy expiry on read.
struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl ResponseCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        if self.ttl.is_zero() {
            return None;
        }
        let g = self.entries.lock().ok()?;
        let hit = g
            .get(key)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, body)| body.clone());
        hit
    }

    fn put(&self, key: String, body: String) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut g) = self.entries.lock() {
            let ttl = self.ttl;
            g.retain(|_, (at, _)| at.elapsed() < ttl);
            g.insert(key, (Instant::now(), body));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::ingest::types::LocationHints;

    const BODY: &str = r#"{
        "records": [
            {"id":"l1","groupKey":"rinkA","name":"Stick &amp; Puck",
             "date":"2026-10-20","startTime":"10:00"},
            {"id":"l2","groupKey":"rinkA","name":"Broken","date":"not-a-date"},
            {"id":"l3","groupKey":"rinkA","name":7}
        ]
    }"#;

    #[tokio::test]
    async fn fixture_records_are_stamped_and_validated() {
        let p = LiveHttpProvider::from_fixture_str("daysmart", BODY);
        let out = p.fetch(&FetchContext::default()).await;
        let SourceOutcome::Confirmed(batch) = out else {
            panic!("expected confirmed");
        };
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].name, "Stick & Puck");
        assert_eq!(batch.records[0].source, SourceKind::Live("daysmart".into()));
        assert_eq!(batch.scope, Scope::AllManaged);
    }

    #[tokio::test]
    async fn explicit_empty_answer_is_still_confirmed() {
        let p =
            LiveHttpProvider::from_fixture_str("daysmart", r#"{"records":[],"groups":["rinkA"]}"#);
        let out = p.fetch(&FetchContext::default()).await;
        let SourceOutcome::Confirmed(batch) = out else {
            panic!("expected confirmed");
        };
        assert!(batch.records.is_empty());
        assert_eq!(batch.scope, Scope::Groups(["rinkA".to_string()].into()));
    }

    #[tokio::test]
    async fn garbage_body_is_unconfirmed() {
        let p = LiveHttpProvider::from_fixture_str("daysmart", "<html>502</html>");
        let out = p.fetch(&FetchContext::default()).await;
        assert!(matches!(out, SourceOutcome::Unconfirmed(SourceError::Decode(_))));
    }

    #[test]
    fn url_carries_query_location_and_hints() {
        let ctx = FetchContext {
            query: Some(" goalie ".into()),
            location: Some(GeoPoint::new(44.97, -93.26)),
            hints: LocationHints {
                city: Some("Minneapolis".into()),
                state: None,
                country: Some("  ".into()),
            },
            force_refresh: false,
        };
        let url = build_url("https://example.test/sessions", &ctx, 2, 50).unwrap();
        assert!(url.contains("page=2"));
        assert!(url.contains("pageSize=50"));
        assert!(url.contains("q=goalie"));
        assert!(url.contains("lat=44.9700"));
        assert!(url.contains("city=Minneapolis"));
        assert!(!url.contains("country="));
    }

    #[test]
    fn response_cache_respects_ttl() {
        let c = ResponseCache::new(Duration::from_secs(60));
        c.put("k".into(), "body".into());
        assert_eq!(c.get("k").as_deref(), Some("body"));

        let off = ResponseCache::new(Duration::ZERO);
        off.put("k".into(), "body".into());
        assert!(off.get("k").is_none());
    }
}

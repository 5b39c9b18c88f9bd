//! # Result Cache
//! In-process, TTL-bound cache of search payloads keyed by (query, location bucket).
//!
//! - `get` is a hit only while `now - timestamp < ttl`; expiry is lazy, on read.
//!   There is no background sweep.
//! - `put` overwrites unconditionally (last writer wins across concurrent requests).
//! - A poisoned lock degrades to "always miss" and writes become no-ops; the
//!   request itself never fails because of the cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::geo::{bucket_key, GeoPoint};

pub const ALL_QUERY_TOKEN: &str = "__all__";
pub const GLOBAL_LOCATION_TOKEN: &str = "global";

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: Arc<T>,
    pub timestamp_ms: u64,
}

#[derive(Debug)]
pub struct ResultCache<T> {
    ttl_ms: u64,
    entries: RwLock<HashMap<String, Arc<CacheEntry<T>>>>,
}

impl<T> ResultCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// `query-or-__all__` + `|` + `lat,lng` on the ~11 km grid, or `global`.
    pub fn key(query: Option<&str>, location: Option<GeoPoint>) -> String {
        let q = query
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| ALL_QUERY_TOKEN.to_string());
        let loc = location
            .filter(GeoPoint::is_known)
            .map(bucket_key)
            .unwrap_or_else(|| GLOBAL_LOCATION_TOKEN.to_string());
        format!("{q}|{loc}")
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.get_at(key, now_ms())
    }

    pub fn get_at(&self, key: &str, now_ms: u64) -> Option<Arc<T>> {
        let entry = {
            let guard = match self.entries.read() {
                Ok(g) => g,
                Err(_) => {
                    tracing::warn!(target: "cache", "result cache lock poisoned, treating as miss");
                    return None;
                }
            };
            guard.get(key).cloned()
        }?;

        let age = now_ms.saturating_sub(entry.timestamp_ms);
        (age < self.ttl_ms).then(|| Arc::clone(&entry.payload))
    }

    pub fn put(&self, key: &str, payload: impl Into<Arc<T>>) {
        self.put_at(key, payload, now_ms())
    }

    pub fn put_at(&self, key: &str, payload: impl Into<Arc<T>>, now_ms: u64) {
        let entry = Arc::new(CacheEntry {
            key: key.to_string(),
            payload: payload.into(),
            timestamp_ms: now_ms,
        });
        match self.entries.write() {
            Ok(mut g) => {
                g.insert(entry.key.clone(), entry);
            }
            Err(_) => {
                tracing::warn!(target: "cache", key, "result cache lock poisoned, skipping write");
            }
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

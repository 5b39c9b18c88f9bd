//! Service configuration: search timing, baseline location, and the live source table.
//!
//! Resolution order:
//! 1) `$LISTINGS_CONFIG_PATH`
//! 2) `config/listings.toml`
//! 3) built-in defaults (no live sources, embedded baseline)
//!
//! Timing knobs can be overridden per-process with `LISTINGS_CACHE_TTL_MS`,
//! `LISTINGS_SOURCE_TIMEOUT_MS` and `LISTINGS_DEADLINE_MS`.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/listings.toml";
pub const ENV_CONFIG_PATH: &str = "LISTINGS_CONFIG_PATH";
pub const ENV_CACHE_TTL_MS: &str = "LISTINGS_CACHE_TTL_MS";
pub const ENV_SOURCE_TIMEOUT_MS: &str = "LISTINGS_SOURCE_TIMEOUT_MS";
pub const ENV_DEADLINE_MS: &str = "LISTINGS_DEADLINE_MS";

fn default_source_timeout_ms() -> u64 {
    4_000
}
fn default_deadline_ms() -> u64 {
    25_000
}
fn default_cache_ttl_secs() -> u64 {
    15 * 60
}
fn default_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    5
}
fn default_response_ttl_secs() -> u64 {
    5 * 60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub baseline: BaselineSettings,
    #[serde(default)]
    pub live: Vec<LiveSourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_source_timeout_ms")]
    pub per_source_timeout_ms: u64,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Exact TTL in ms; only set from env, wins over `cache_ttl_secs`.
    #[serde(skip)]
    pub cache_ttl_ms_override: Option<u64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: default_source_timeout_ms(),
            deadline_ms: default_deadline_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_ttl_ms_override: None,
        }
    }
}

impl SearchSettings {
    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        match self.cache_ttl_ms_override {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BaselineSettings {
    /// JSON or TOML dataset; falls back to the embedded seed when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// One live provider and the groups it is authoritative for.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveSourceConfig {
    pub name: String,
    pub url: String,
    /// Managed-group registry entry: baseline records for these groups are
    /// superseded whenever this source confirms.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_response_ttl_secs")]
    pub response_ttl_secs: u64,
}

impl AppConfig {
    /// Load from an explicit TOML path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading listings config from {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing listings config")?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    /// Env path, then `config/listings.toml`, then defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from(&p);
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn sanitize(&mut self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for src in &mut self.live {
            src.name = src.name.trim().to_string();
            if src.name.is_empty() {
                return Err(anyhow!("live source with empty name"));
            }
            if !seen.insert(src.name.clone()) {
                return Err(anyhow!("duplicate live source name: {}", src.name));
            }
            src.groups.retain(|g| !g.trim().is_empty());
            src.page_size = src.page_size.max(1);
            src.max_pages = src.max_pages.max(1);
        }
        if self.search.per_source_timeout_ms == 0 {
            self.search.per_source_timeout_ms = default_source_timeout_ms();
        }
        if self.search.deadline_ms == 0 {
            self.search.deadline_ms = default_deadline_ms();
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(ms) = parse_ms_env(ENV_CACHE_TTL_MS) {
            self.search.cache_ttl_ms_override = Some(ms);
        }
        if let Some(ms) = parse_ms_env(ENV_SOURCE_TIMEOUT_MS).filter(|v| *v > 0) {
            self.search.per_source_timeout_ms = ms;
        }
        if let Some(ms) = parse_ms_env(ENV_DEADLINE_MS).filter(|v| *v > 0) {
            self.search.deadline_ms = ms;
        }
    }
}

fn parse_ms_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

use crate::core::types::{DemandSignal, SignalStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(deserialize_with = "lenient_timestamp")]
    timestamp: DateTime<Utc>,
    data: DemandSignal,
}

/// Search term -> last computed demand signal, with a freshness window.
///
/// Keys are the raw search term (case-sensitive). When a path is set every
/// `store` rewrites the whole file via a temp file + rename, so a crash
/// mid-write leaves the previous file intact.
pub struct SignalCache {
    entries: BTreeMap<String, CacheEntry>,
    ttl: chrono::Duration,
    path: Option<PathBuf>,
}

impl SignalCache {
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl: to_chrono(ttl),
            path: None,
        }
    }

    /// Loads the cache file if present. A missing or unreadable file starts an empty cache.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let ttl = to_chrono(ttl);
        let mut entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load signal cache {}: {:#}", path.display(), e);
                BTreeMap::new()
            }
        };

        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.timestamp < ttl);
        if before != entries.len() {
            debug!("Dropped {} expired cache entries", before - entries.len());
        }
        info!(
            "Signal cache {} loaded with {} fresh entries",
            path.display(),
            entries.len()
        );

        Self {
            entries,
            ttl,
            path: Some(path),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, key: &str) -> Option<DemandSignal> {
        self.lookup_at(key, Utc::now())
    }

    /// Fresh entry for `key`, re-tagged as `cached`.
    pub fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> Option<DemandSignal> {
        let entry = self.entries.get(key)?;
        if now - entry.timestamp >= self.ttl {
            return None;
        }
        let mut signal = entry.data.clone();
        signal.status = SignalStatus::Cached;
        Some(signal)
    }

    pub fn store(&mut self, key: &str, signal: DemandSignal) {
        self.store_at(key, signal, Utc::now());
    }

    /// Overwrites any existing entry for `key`.
    pub fn store_at(&mut self, key: &str, signal: DemandSignal, now: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                timestamp: now,
                data: signal,
            },
        );
        if let Err(e) = self.persist() {
            warn!("Failed to save signal cache: {:#}", e);
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_string_pretty(&self.entries).context("serializing cache")?;

        let tmp = tmp_path(path);
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, CacheEntry>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&raw).context("parsing cache json")?;

    let mut entries = BTreeMap::new();
    for (term, value) in raw {
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => {
                entries.insert(term, entry);
            }
            Err(e) => warn!("Dropping unreadable cache entry '{}': {}", term, e),
        }
    }
    Ok(entries)
}

/// RFC 3339, or an ISO-8601 timestamp without offset read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

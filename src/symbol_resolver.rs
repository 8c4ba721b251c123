//! Maps free-form asset names to CoinGecko ids.
//!
//! The full `/coins/list` directory is fetched at most once per freshness
//! window and kept as an immutable [`DirectorySnapshot`]. Readers share the
//! current snapshot through an `Arc`; refreshes are serialised so only one
//! request is in flight at a time.

use crate::error::FetchError;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DIRECTORY_TTL_HOURS: i64 = 24;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CoinEntry {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    pub entries: Vec<CoinEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl DirectorySnapshot {
    pub fn new(entries: Vec<CoinEntry>, fetched_at: DateTime<Utc>) -> Self {
        Self { entries, fetched_at }
    }

    /// An empty directory is never fresh, so a failed fetch is retried on the next lookup.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.entries.is_empty() && now - self.fetched_at < ttl
    }

    /// Case-insensitive exact match. An id match wins over a ticker match;
    /// among ticker matches the first directory entry wins.
    pub fn lookup(&self, query: &str) -> Option<&str> {
        self.lookup_entry(query).map(|c| c.id.as_str())
    }

    pub fn lookup_entry(&self, query: &str) -> Option<&CoinEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|c| c.id.to_lowercase() == needle)
            .or_else(|| self.entries.iter().find(|c| c.symbol.to_lowercase() == needle))
    }
}

pub struct SymbolResolver {
    client: Client,
    base_url: String,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<DirectorySnapshot>>>,
    refresh_lock: Mutex<()>,
}

impl SymbolResolver {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl: Duration::hours(DIRECTORY_TTL_HOURS),
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolves `query` to a canonical id, refreshing the directory if stale.
    ///
    /// `None` means unresolved: either nothing matched or the directory could
    /// not be fetched.
    pub async fn resolve(&self, query: &str) -> Option<String> {
        let snapshot = self.current().await;
        match snapshot.lookup_entry(query) {
            Some(entry) => {
                debug!("Resolved '{}' to '{}' ({})", query, entry.id, entry.name);
                Some(entry.id.clone())
            }
            None => {
                debug!("Could not resolve '{}' ({} directory entries)", query, snapshot.entries.len());
                None
            }
        }
    }

    /// Returns a fresh snapshot, fetching one if the cached copy is missing or stale.
    pub async fn current(&self) -> Arc<DirectorySnapshot> {
        if let Some(snapshot) = self.fresh_cached().await {
            return snapshot;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(snapshot) = self.fresh_cached().await {
            return snapshot;
        }
        self.refresh_locked().await
    }

    /// Unconditionally re-fetches the directory.
    pub async fn refresh(&self) -> Arc<DirectorySnapshot> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn fresh_cached(&self) -> Option<Arc<DirectorySnapshot>> {
        let cached = self.snapshot.read().await;
        cached
            .as_ref()
            .filter(|s| s.is_fresh(Utc::now(), self.ttl))
            .cloned()
    }

    async fn refresh_locked(&self) -> Arc<DirectorySnapshot> {
        let entries = match self.fetch_directory().await {
            Ok(entries) => {
                info!("Fetched coin directory with {} entries", entries.len());
                entries
            }
            Err(e) => {
                warn!("Coin directory fetch failed, lookups will be unresolved: {}", e);
                Vec::new()
            }
        };

        let snapshot = Arc::new(DirectorySnapshot::new(entries, Utc::now()));
        *self.snapshot.write().await = Some(Arc::clone(&snapshot));
        snapshot
    }

    async fn fetch_directory(&self) -> Result<Vec<CoinEntry>, FetchError> {
        let url = format!("{}/coins/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        response
            .json::<Vec<CoinEntry>>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

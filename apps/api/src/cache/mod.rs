//! Content cache — content-addressed, TTL-expiring store for expensive oracle responses.
//!
//! Entries are JSON files named `<digest>.json` under the cache directory. Every
//! operation degrades to "miss" on failure: an unreadable, unwritable or corrupt
//! cache never blocks or fails the caller.
//!
//! The methods here do blocking file I/O; async callers go through `fetch` and
//! `store`, which run them on the blocking pool.

pub mod handlers;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// One cached oracle response. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheFileInfo {
    pub key: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    /// `None` when the entry cannot be read back.
    pub created_at: Option<DateTime<Utc>>,
    /// Age from `created_at`, falling back to the file's modification time.
    pub age_secs: i64,
}

/// Diagnostic listing, entries newest first.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub directory: String,
    pub entry_count: usize,
    pub total_bytes: u64,
    pub entries: Vec<CacheFileInfo>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ClearStats {
    pub removed_count: usize,
    pub bytes_freed: u64,
}

pub struct ContentCache {
    dir: PathBuf,
    ttl: chrono::Duration,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(
                "Could not create cache directory {}: {e}; caching will behave as always-miss",
                dir.display()
            );
        }
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        Self { dir, ttl }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Deterministic digest over the operation name, the raw content and the
    /// extra parameters sorted by name. Fields are length-prefixed so no two
    /// distinct inputs share a byte stream.
    pub fn key(operation: &str, content: &str, extra: &[(&str, &str)]) -> String {
        let mut params: Vec<&(&str, &str)> = extra.iter().collect();
        params.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

        let mut hasher = Sha256::new();
        feed(&mut hasher, operation);
        feed(&mut hasher, content);
        hasher.update((params.len() as u64).to_le_bytes());
        for (name, value) in params {
            feed(&mut hasher, name);
            feed(&mut hasher, value);
        }

        let key = hex::encode(hasher.finalize());
        debug!("Generated cache key {} for operation: {operation}", &key[..8]);
        key
    }

    /// Returns the cached payload if present and unexpired. Stale or corrupt
    /// entries are removed as a side effect.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now())
    }

    /// Typed read. A payload that no longer matches `T` is treated as corrupt.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cached payload for {} has an unexpected shape: {e}", short(key));
                self.remove(key);
                None
            }
        }
    }

    /// Best-effort write. An existing unexpired entry is kept (first write wins).
    pub fn put(&self, key: &str, payload: &Value) {
        self.put_at(key, payload, Utc::now());
    }

    /// `get_as` on the blocking pool.
    pub async fn fetch<T>(self: &Arc<Self>, key: &str) -> Option<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let cache = Arc::clone(self);
        let key = key.to_string();
        match tokio::task::spawn_blocking(move || cache.get_as::<T>(&key)).await {
            Ok(hit) => hit,
            Err(e) => {
                error!("Cache read task failed: {e}");
                None
            }
        }
    }

    /// Typed `put` on the blocking pool.
    pub async fn store<T: Serialize>(self: &Arc<Self>, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not serialize cache payload for {}: {e}", short(key));
                return;
            }
        };
        let cache = Arc::clone(self);
        let key = key.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || cache.put(&key, &payload)).await {
            error!("Cache write task failed: {e}");
        }
    }

    /// Deletes every entry.
    pub fn clear(&self) -> ClearStats {
        info!("Clearing all cached responses");
        let mut stats = ClearStats::default();

        for path in self.entry_paths() {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(&path) {
                Ok(()) => {
                    stats.removed_count += 1;
                    stats.bytes_freed += size;
                }
                Err(e) => error!("Could not remove cache file {}: {e}", path.display()),
            }
        }

        info!(
            "Cache cleared: {} entries removed, {} bytes freed",
            stats.removed_count, stats.bytes_freed
        );
        stats
    }

    pub fn info(&self) -> CacheInfo {
        let now = Utc::now();
        let mut entries: Vec<CacheFileInfo> = self
            .entry_paths()
            .into_iter()
            .filter_map(|path| {
                let metadata = match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Could not stat cache file {}: {e}", path.display());
                        return None;
                    }
                };
                let modified: DateTime<Utc> = metadata.modified().ok()?.into();
                let key = path.file_stem()?.to_string_lossy().into_owned();
                let created_at = read_entry(&path).ok().map(|entry| entry.created_at);
                Some(CacheFileInfo {
                    key,
                    size_bytes: metadata.len(),
                    modified,
                    created_at,
                    age_secs: (now - created_at.unwrap_or(modified)).num_seconds(),
                })
            })
            .collect();

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));

        CacheInfo {
            directory: self.dir.display().to_string(),
            entry_count: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            entries,
        }
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let path = self.entry_path(key)?;

        let entry = match read_entry(&path) {
            Ok(entry) => entry,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache entry for key: {}", short(key));
                return None;
            }
            Err(e) => {
                warn!("Corrupted cache entry removed for {}: {e}", short(key));
                self.remove(key);
                return None;
            }
        };

        if entry.key != key {
            warn!("Cache entry {} carries a different key, removing", short(key));
            self.remove(key);
            return None;
        }

        if now - entry.created_at < self.ttl {
            info!("Using cached response for {}...", short(key));
            Some(entry.payload)
        } else {
            info!(
                "Expired cache entry removed for {} (age: {}s)",
                short(key),
                (now - entry.created_at).num_seconds()
            );
            self.remove(key);
            None
        }
    }

    fn put_at(&self, key: &str, payload: &Value, now: DateTime<Utc>) {
        let Some(path) = self.entry_path(key) else {
            return;
        };

        if self.get_at(key, now).is_some() {
            debug!("Cache entry {} already present, keeping first write", short(key));
            return;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            created_at: now,
            payload: payload.clone(),
        };

        match self.write_entry(&path, &entry) {
            Ok(()) => info!("Cached response for {}...", short(key)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("Cache entry {} written concurrently, keeping first write", short(key));
            }
            Err(e) => error!("Could not save cache for {}: {e}", short(key)),
        }
    }

    /// Never replaces an existing file; `get_at` has already removed an
    /// expired one.
    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec_pretty(entry)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.persist_noclobber(path)?;
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Some(path) = self.entry_path(key) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!("Failed to remove cache file {}: {e}", path.display());
                }
            }
        }
    }

    /// Only hex digests map to files; anything else is a miss.
    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            warn!("Rejected malformed cache key {key:?}");
            return None;
        }
        Some(self.dir.join(format!("{key}.json")))
    }

    fn entry_paths(&self) -> Vec<PathBuf> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) => {
                debug!("Cache directory {} not readable: {e}", self.dir.display());
                return Vec::new();
            }
        };
        read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }
}

fn read_entry(path: &Path) -> std::io::Result<CacheEntry> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn feed(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_le_bytes());
    hasher.update(part.as_bytes());
}

fn short(key: &str) -> &str {
    &key[..key.len().min(8)]
}

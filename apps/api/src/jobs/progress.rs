//! Progress Store — rendezvous between a running pipeline and status pollers.
//!
//! Two backends behind one trait:
//!   - `RedisProgressStore`: shared and TTL-capable, survives restarts.
//!   - `InMemoryProgressStore`: process-local map behind a single lock.
//!
//! `connect_progress_store` probes Redis once at startup and picks the backend.
//! The Redis store embeds an in-memory store and writes there whenever a Redis
//! command fails, so a snapshot is never dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ProgressSettings;
use crate::models::task::TaskSnapshot;

const KEY_PREFIX: &str = "job_progress:";
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Task-id → latest snapshot. Last write wins.
///
/// Operations never fail from the caller's point of view; backend problems
/// are logged and absorbed.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Upserts the snapshot, stamping `updated_at` with the write time.
    async fn set(&self, task_id: &str, snapshot: TaskSnapshot);

    async fn get(&self, task_id: &str) -> Option<TaskSnapshot>;

    async fn delete(&self, task_id: &str);

    /// Shortens the entry's lifetime so it disappears `after` from now.
    async fn schedule_purge(&self, task_id: &str, after: Duration);

    /// Drops expired in-process entries. Returns how many were removed.
    async fn purge_expired(&self) -> usize;

    fn backend(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ────────────────────────────────────────────────────────────────────────────

struct Slot {
    snapshot: TaskSnapshot,
    expires_at: Instant,
}

pub struct InMemoryProgressStore {
    entries: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
}

impl InMemoryProgressStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn insert(&self, task_id: &str, snapshot: TaskSnapshot) {
        let slot = Slot {
            snapshot,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().insert(task_id.to_string(), slot);
    }

    fn lookup(&self, task_id: &str) -> Option<TaskSnapshot> {
        let mut entries = self.entries.lock();
        match entries.get(task_id) {
            Some(slot) if slot.expires_at > Instant::now() => Some(slot.snapshot.clone()),
            Some(_) => {
                entries.remove(task_id);
                None
            }
            None => None,
        }
    }

    fn remove(&self, task_id: &str) {
        self.entries.lock().remove(task_id);
    }

    fn expire_in(&self, task_id: &str, after: Duration) {
        if let Some(slot) = self.entries.lock().get_mut(task_id) {
            slot.expires_at = slot.expires_at.min(Instant::now() + after);
        }
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, slot| slot.expires_at > now);
        before - entries.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn set(&self, task_id: &str, mut snapshot: TaskSnapshot) {
        snapshot.updated_at = Utc::now();
        self.insert(task_id, snapshot);
    }

    async fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.lookup(task_id)
    }

    async fn delete(&self, task_id: &str) {
        self.remove(task_id);
    }

    async fn schedule_purge(&self, task_id: &str, after: Duration) {
        self.expire_in(task_id, after);
    }

    async fn purge_expired(&self) -> usize {
        self.sweep()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis backend
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisProgressStore {
    conn: MultiplexedConnection,
    ttl: Duration,
    fallback: InMemoryProgressStore,
}

impl RedisProgressStore {
    /// Connects and verifies the server answers `PING` within a short timeout.
    pub async fn connect(url: &str, ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("Invalid REDIS_URL")?;

        let conn = tokio::time::timeout(PROBE_TIMEOUT, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(conn)
        })
        .await
        .map_err(|_| anyhow!("Redis probe timed out after {PROBE_TIMEOUT:?}"))?
        .context("Redis probe failed")?;

        Ok(Self {
            conn,
            ttl,
            fallback: InMemoryProgressStore::new(ttl),
        })
    }

    fn key(task_id: &str) -> String {
        format!("{KEY_PREFIX}{task_id}")
    }

    async fn redis_get(&self, task_id: &str) -> Option<TaskSnapshot> {
        let mut conn = self.conn.clone();
        let raw = match redis::cmd("GET")
            .arg(Self::key(task_id))
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Redis GET failed for task {task_id}: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Discarding unreadable progress for task {task_id}: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn set(&self, task_id: &str, mut snapshot: TaskSnapshot) {
        snapshot.updated_at = Utc::now();

        let payload = match serde_json::to_string(&snapshot) {
            Ok(p) => p,
            Err(e) => {
                warn!("Progress for task {task_id} not serializable ({e}); keeping in memory");
                self.fallback.insert(task_id, snapshot);
                return;
            }
        };

        let mut conn = self.conn.clone();
        let written = redis::cmd("SET")
            .arg(Self::key(task_id))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await;

        settle_write(&self.fallback, task_id, snapshot, written);
    }

    async fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        let remote = self.redis_get(task_id).await;
        let local = self.fallback.lookup(task_id);
        newer_snapshot(remote, local)
    }

    async fn delete(&self, task_id: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("DEL")
            .arg(Self::key(task_id))
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("Redis DEL failed for task {task_id}: {e}");
        }
        self.fallback.remove(task_id);
    }

    async fn schedule_purge(&self, task_id: &str, after: Duration) {
        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("EXPIRE")
            .arg(Self::key(task_id))
            .arg(after.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
        {
            warn!("Redis EXPIRE failed for task {task_id}: {e}");
        }
        self.fallback.expire_in(task_id, after);
    }

    async fn purge_expired(&self) -> usize {
        self.fallback.sweep()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// A successful Redis write supersedes any fallback copy; a failed one lands
/// in the fallback.
fn settle_write(
    fallback: &InMemoryProgressStore,
    task_id: &str,
    snapshot: TaskSnapshot,
    written: redis::RedisResult<()>,
) {
    match written {
        Ok(()) => fallback.remove(task_id),
        Err(e) => {
            warn!("Redis SET failed for task {task_id}: {e}; using in-memory fallback");
            fallback.insert(task_id, snapshot);
        }
    }
}

/// Ties go to the local copy, which is only written when Redis failed.
fn newer_snapshot(
    remote: Option<TaskSnapshot>,
    local: Option<TaskSnapshot>,
) -> Option<TaskSnapshot> {
    match (remote, local) {
        (Some(r), Some(l)) => Some(if l.updated_at >= r.updated_at { l } else { r }),
        (r, l) => r.or(l),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Factory and reaper
// ────────────────────────────────────────────────────────────────────────────

/// Picks Redis when `redis_url` is set and reachable, otherwise in-memory.
pub async fn connect_progress_store(settings: &ProgressSettings) -> Arc<dyn ProgressStore> {
    if let Some(url) = settings.redis_url.as_deref() {
        match RedisProgressStore::connect(url, settings.ttl).await {
            Ok(store) => {
                info!("Progress store: redis");
                return Arc::new(store);
            }
            Err(e) => warn!("Redis unavailable ({e:#}); falling back to in-memory progress store"),
        }
    }

    info!("Progress store: memory");
    Arc::new(InMemoryProgressStore::new(settings.ttl))
}

/// Periodically drops expired entries until `cancel` fires.
pub fn spawn_reaper(
    store: Arc<dyn ProgressStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("progress reaper started (interval={interval:?})");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("progress reaper stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    match store.purge_expired().await {
                        0 => {}
                        n => debug!("progress reaper: purged {n} tasks"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskPhase;

    fn snapshot(percent: u8) -> TaskSnapshot {
        TaskSnapshot::new(TaskPhase::Scraping, percent, "Searching")
    }

    #[tokio::test]
    async fn test_set_get_overwrites() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        store.set("t1", snapshot(5)).await;
        store.set("t1", snapshot(15)).await;

        let got = store.get("t1").await.unwrap();
        assert_eq!(got.percent, 15);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_set_stamps_write_time() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        let mut old = snapshot(5);
        old.updated_at = Utc::now() - chrono::Duration::hours(1);
        store.set("t1", old).await;

        let got = store.get("t1").await.unwrap();
        assert!(Utc::now() - got.updated_at < chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        store.set("t1", snapshot(5)).await;
        store.delete("t1").await;
        assert!(store.get("t1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let store = InMemoryProgressStore::new(Duration::from_secs(60));
        store.set("t1", snapshot(5)).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("t1").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("t1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_purge_shortens_lifetime() {
        let store = InMemoryProgressStore::new(Duration::from_secs(3600));
        store.set("done", snapshot(100)).await;
        store.set("running", snapshot(40)).await;
        store.schedule_purge("done", Duration::from_secs(300)).await;

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get("done").await.is_none());
        assert!(store.get("running").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_until_cancelled() {
        let store = Arc::new(InMemoryProgressStore::new(Duration::from_secs(10)));
        store.set("t1", snapshot(5)).await;
        store.set("t2", snapshot(5)).await;

        let cancel = CancellationToken::new();
        let handle = spawn_reaper(store.clone(), Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(store.len(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_factory_without_url_uses_memory() {
        let store = connect_progress_store(&ProgressSettings::default()).await;
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_factory_falls_back_when_redis_unreachable() {
        let settings = ProgressSettings {
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            ..ProgressSettings::default()
        };
        let store = connect_progress_store(&settings).await;
        assert_eq!(store.backend(), "memory");

        store.set("t1", snapshot(5)).await;
        assert_eq!(store.get("t1").await.unwrap().percent, 5);
    }

    fn stamped(percent: u8, minutes_ago: i64) -> TaskSnapshot {
        let mut s = snapshot(percent);
        s.updated_at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        s
    }

    #[test]
    fn test_newer_snapshot_wins() {
        let got = newer_snapshot(Some(stamped(40, 5)), Some(stamped(55, 1))).unwrap();
        assert_eq!(got.percent, 55);

        let got = newer_snapshot(Some(stamped(60, 1)), Some(stamped(15, 5))).unwrap();
        assert_eq!(got.percent, 60);
    }

    #[test]
    fn test_newer_snapshot_with_one_side_missing() {
        assert_eq!(newer_snapshot(Some(stamped(40, 0)), None).unwrap().percent, 40);
        assert_eq!(newer_snapshot(None, Some(stamped(15, 0))).unwrap().percent, 15);
        assert!(newer_snapshot(None, None).is_none());
    }

    #[tokio::test]
    async fn test_failed_redis_write_lands_in_fallback() {
        let fallback = InMemoryProgressStore::new(Duration::from_secs(60));
        let refused = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));

        settle_write(&fallback, "t1", snapshot(40), Err(refused));
        assert_eq!(fallback.lookup("t1").unwrap().percent, 40);

        settle_write(&fallback, "t1", snapshot(55), Ok(()));
        assert!(fallback.lookup("t1").is_none());
    }
}

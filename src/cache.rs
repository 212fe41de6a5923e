//! TTL-gated snapshot cache, one instance per source fetcher.
//!
//! Readers get the current snapshot via an atomic `Arc` handoff and never
//! block on upstream. All mutation goes through [`SourceCache::refresh_with`],
//! which is serialised by a single-flight guard: under any concurrent
//! schedule at most one upstream fetch is in flight, and waiters observe the
//! winner's result on return.
//!
//! Optional disk persistence writes one JSON document per cache
//! (`{value, last_updated}`) so long-TTL sources survive restarts.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Outcome of a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call performed the upstream fetch and replaced the snapshot.
    Refreshed,
    /// Nothing to do: still fresh, frozen, or another caller just finished.
    Skipped,
}

/// Cache status surfaced next to every cached read.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub source: String,
    pub last_updated: Option<DateTime<Utc>>,
    /// Age in seconds, -1 when the cache has never been filled.
    pub age_seconds: i64,
    pub ttl_seconds: i64,
    pub is_valid: bool,
    pub freeze_mode: bool,
    pub next_refresh_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
}

/// On-disk form of a snapshot. `last_updated` is RFC 3339 with offset;
/// a timestamp without offset is read back as UTC.
#[derive(Serialize, Deserialize)]
struct DiskSnapshot<T> {
    value: T,
    last_updated: Option<String>,
}

struct Slot<T> {
    value: Option<Arc<T>>,
    last_updated: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            last_updated: None,
            last_error: None,
            last_error_at: None,
        }
    }
}

/// Memory-first snapshot cache with TTL, freeze mode, single-flight refresh,
/// and optional disk persistence.
pub struct SourceCache<T> {
    name: String,
    ttl: chrono::Duration,
    freeze: bool,
    snapshot_path: Option<PathBuf>,
    slot: RwLock<Slot<T>>,
    // Single-flight gate; held only for the duration of one fetch.
    refresh_gate: Mutex<()>,
}

impl<T> SourceCache<T> {
    pub fn new(name: &str, ttl_seconds: u64) -> Self {
        Self {
            name: name.to_string(),
            ttl: chrono::Duration::seconds(ttl_seconds as i64),
            freeze: false,
            snapshot_path: None,
            slot: RwLock::new(Slot::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Enable freeze mode: `refresh_with` becomes a no-op and the cache is
    /// considered fresh as long as it holds any value.
    pub fn with_freeze(mut self, freeze: bool) -> Self {
        self.freeze = freeze;
        self
    }

    /// Persist snapshots as `<dir>/<name>.json`.
    pub fn with_snapshot_dir(mut self, dir: Option<&PathBuf>) -> Self {
        self.snapshot_path = dir.map(|d| d.join(format!("{}.json", self.name)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Current snapshot, if any. Cheap: clones an `Arc`.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().expect("cache lock poisoned").value.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.slot.read().expect("cache lock poisoned").last_updated
    }

    /// Freshness test: `now - last_updated < ttl`, or unconditionally true
    /// under freeze once a value exists.
    pub fn is_fresh(&self) -> bool {
        let slot = self.slot.read().expect("cache lock poisoned");
        if self.freeze && slot.value.is_some() {
            return true;
        }
        match (&slot.value, slot.last_updated) {
            (Some(_), Some(at)) => Utc::now() - at < self.ttl,
            _ => false,
        }
    }

    /// Replace the snapshot and stamp `last_updated`. Clears the error state.
    pub fn store(&self, value: T) {
        let mut slot = self.slot.write().expect("cache lock poisoned");
        slot.value = Some(Arc::new(value));
        slot.last_updated = Some(Utc::now());
        slot.last_error = None;
        slot.last_error_at = None;
    }

    /// Record an upstream failure without touching the current value.
    pub fn record_error(&self, detail: &str) {
        let mut slot = self.slot.write().expect("cache lock poisoned");
        slot.last_error = Some(detail.to_string());
        slot.last_error_at = Some(Utc::now());
    }

    pub fn cache_info(&self) -> CacheInfo {
        let slot = self.slot.read().expect("cache lock poisoned");
        let now = Utc::now();
        let age_seconds = slot
            .last_updated
            .map(|at| (now - at).num_seconds())
            .unwrap_or(-1);
        let is_valid = if self.freeze && slot.value.is_some() {
            true
        } else {
            matches!((&slot.value, slot.last_updated), (Some(_), Some(at)) if now - at < self.ttl)
        };
        let next_refresh_seconds = if slot.last_updated.is_some() {
            (self.ttl.num_seconds() - age_seconds).max(0)
        } else {
            0
        };

        CacheInfo {
            source: self.name.clone(),
            last_updated: slot.last_updated,
            age_seconds,
            ttl_seconds: self.ttl.num_seconds(),
            is_valid,
            freeze_mode: self.freeze,
            next_refresh_seconds,
            last_error: slot.last_error.clone(),
            last_error_at: slot.last_error_at,
        }
    }

    /// Run one refresh cycle with single-flight coalescing.
    ///
    /// Concurrent callers queue on the gate; when the winner finishes, the
    /// queued callers notice the newer `last_updated` and return `Skipped`
    /// without issuing a second upstream fetch. A fetch error is recorded in
    /// the cache metadata and the previous snapshot is left untouched.
    pub async fn refresh_with<F, Fut>(&self, force: bool, fetch: F) -> Result<RefreshOutcome, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        if self.freeze {
            debug!(source = %self.name, "freeze mode active, refresh skipped");
            return Ok(RefreshOutcome::Skipped);
        }

        let entered_at = Utc::now();
        let _guard = self.refresh_gate.lock().await;

        // A winner may have completed while we queued on the gate: coalesce
        // onto its result instead of issuing another upstream fetch.
        if self.last_updated().is_some_and(|at| at >= entered_at) {
            return Ok(RefreshOutcome::Skipped);
        }
        {
            let slot = self.slot.read().expect("cache lock poisoned");
            if slot.last_error_at.is_some_and(|at| at >= entered_at) {
                let detail = slot.last_error.clone().unwrap_or_default();
                return Err(CoreError::provider(&self.name, detail));
            }
        }
        if !force && self.is_fresh() {
            debug!(source = %self.name, "cache still fresh, refresh skipped");
            return Ok(RefreshOutcome::Skipped);
        }

        match fetch().await {
            Ok(value) => {
                self.store(value);
                info!(source = %self.name, "cache refreshed");
                Ok(RefreshOutcome::Refreshed)
            }
            Err(err) => {
                let detail = err.to_string();
                warn!(source = %self.name, error = %detail, "refresh failed, keeping last snapshot");
                self.record_error(&detail);
                Err(err)
            }
        }
    }
}

impl<T> SourceCache<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Write the current snapshot to disk as a single JSON document.
    pub fn snapshot_to_disk(&self) -> std::io::Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let (value, last_updated) = {
            let slot = self.slot.read().expect("cache lock poisoned");
            match &slot.value {
                Some(v) => (T::clone(v), slot.last_updated),
                None => return Ok(()),
            }
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let doc = DiskSnapshot {
            value,
            last_updated: last_updated.map(|at| at.to_rfc3339()),
        };
        let json = serde_json::to_string(&doc)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        debug!(source = %self.name, path = %path.display(), "snapshot written");
        Ok(())
    }

    /// Restore a snapshot from disk.
    ///
    /// The persisted `last_updated` is restored as-is so that TTL accounting
    /// survives restarts; a missing timestamp forces an immediate refresh by
    /// treating the entry as epoch-old. A corrupted file is ignored and the
    /// cache stays empty.
    pub fn load_from_disk(&self) -> bool {
        let Some(path) = &self.snapshot_path else {
            return false;
        };
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        let doc: DiskSnapshot<T> = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(source = %self.name, error = %err, "corrupted snapshot ignored");
                return false;
            }
        };

        let last_updated = doc
            .last_updated
            .as_deref()
            .map(parse_stored_timestamp)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default());

        let mut slot = self.slot.write().expect("cache lock poisoned");
        slot.value = Some(Arc::new(doc.value));
        slot.last_updated = Some(last_updated);
        info!(source = %self.name, last_updated = %last_updated, "snapshot loaded from disk");
        true
    }
}

/// Parse a stored timestamp, assuming UTC when the offset is missing.
fn parse_stored_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return at.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        readings: Vec<u32>,
    }

    #[tokio::test]
    async fn test_empty_cache_not_fresh() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 60);
        assert!(!cache.is_fresh());
        assert!(cache.get().is_none());
        assert_eq!(cache.cache_info().age_seconds, -1);
    }

    #[tokio::test]
    async fn test_refresh_stores_value() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 60);

        let outcome = cache
            .refresh_with(false, || async {
                Ok(Payload {
                    readings: vec![1, 2, 3],
                })
            })
            .await
            .unwrap();

        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert!(cache.is_fresh());
        assert_eq!(cache.get().unwrap().readings, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_refresh() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 60);
        cache.store(Payload { readings: vec![1] });

        let outcome = cache
            .refresh_with(false, || async {
                panic!("fetch must not run while fresh");
                #[allow(unreachable_code)]
                Ok(Payload { readings: vec![] })
            })
            .await
            .unwrap();

        assert_eq!(outcome, RefreshOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 0);
        cache.store(Payload { readings: vec![42] });

        let result = cache
            .refresh_with(true, || async {
                Err(CoreError::provider("test", "upstream down"))
            })
            .await;

        assert!(result.is_err());
        // Previous snapshot still served, error recorded in metadata
        assert_eq!(cache.get().unwrap().readings, vec![42]);
        let info = cache.cache_info();
        assert!(info.last_error.unwrap().contains("upstream down"));
        assert!(info.last_error_at.is_some());
    }

    #[tokio::test]
    async fn test_successful_refresh_clears_error() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 60);
        cache.record_error("earlier failure");

        cache
            .refresh_with(true, || async { Ok(Payload { readings: vec![7] }) })
            .await
            .unwrap();

        assert!(cache.cache_info().last_error.is_none());
    }

    #[tokio::test]
    async fn test_single_flight_concurrent_refreshes() {
        let cache: Arc<SourceCache<Payload>> = Arc::new(SourceCache::new("test", 60));
        let fetch_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let fetch_count = Arc::clone(&fetch_count);
            handles.push(tokio::spawn(async move {
                cache
                    .refresh_with(true, || async {
                        fetch_count.fetch_add(1, Ordering::SeqCst);
                        // Hold the gate long enough for the others to queue
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(Payload { readings: vec![9] })
                    })
                    .await
            }));
        }

        let mut refreshed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == RefreshOutcome::Refreshed {
                refreshed += 1;
            }
        }

        // Exactly one upstream call; everyone observes the same snapshot
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
        assert_eq!(refreshed, 1);
        assert_eq!(cache.get().unwrap().readings, vec![9]);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_failures() {
        let cache: Arc<SourceCache<Payload>> = Arc::new(SourceCache::new("test", 60));
        let fetch_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = Arc::clone(&cache);
            let fetch_count = Arc::clone(&fetch_count);
            handles.push(tokio::spawn(async move {
                cache
                    .refresh_with(true, || async {
                        fetch_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Err(CoreError::provider("test", "upstream down"))
                    })
                    .await
            }));
        }

        for handle in handles {
            // Everyone sees the failure; nobody piles on a second fetch
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_freeze_mode_pins_cache() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 0).with_freeze(true);
        cache.store(Payload { readings: vec![5] });

        // TTL of zero would normally mean permanently stale
        assert!(cache.is_fresh());

        let outcome = cache
            .refresh_with(true, || async {
                panic!("frozen cache must not refresh");
                #[allow(unreachable_code)]
                Ok(Payload { readings: vec![] })
            })
            .await
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_freeze_mode_without_value_not_fresh() {
        let cache: SourceCache<Payload> = SourceCache::new("test", 60).with_freeze(true);
        assert!(!cache.is_fresh());
    }

    #[tokio::test]
    async fn test_disk_round_trip_preserves_last_updated() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();

        let cache: SourceCache<Payload> =
            SourceCache::new("roundtrip", 3600).with_snapshot_dir(Some(&dir_path));
        cache.store(Payload {
            readings: vec![10, 20],
        });
        let written_at = cache.last_updated().unwrap();
        cache.snapshot_to_disk().unwrap();

        let restored: SourceCache<Payload> =
            SourceCache::new("roundtrip", 3600).with_snapshot_dir(Some(&dir_path));
        assert!(restored.load_from_disk());

        assert_eq!(restored.get().unwrap().readings, vec![10, 20]);
        // RFC 3339 round-trip keeps sub-second precision
        let delta = (restored.last_updated().unwrap() - written_at).num_milliseconds();
        assert!(delta.abs() < 1);
        assert!(restored.is_fresh());
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        std::fs::write(dir_path.join("broken.json"), "{not json").unwrap();

        let cache: SourceCache<Payload> =
            SourceCache::new("broken", 60).with_snapshot_dir(Some(&dir_path));
        assert!(!cache.load_from_disk());
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_missing_timestamp_forces_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        std::fs::write(
            dir_path.join("old.json"),
            r#"{"value":{"readings":[1]},"last_updated":null}"#,
        )
        .unwrap();

        let cache: SourceCache<Payload> =
            SourceCache::new("old", 3600).with_snapshot_dir(Some(&dir_path));
        assert!(cache.load_from_disk());
        // Value restored but treated as epoch-old, so the cache reads stale
        assert!(cache.get().is_some());
        assert!(!cache.is_fresh());
    }

    #[test]
    fn test_parse_stored_timestamp_without_offset() {
        // Naive timestamps are taken as UTC
        let at = parse_stored_timestamp("2024-11-28T06:30:00");
        assert_eq!(at.to_rfc3339(), "2024-11-28T06:30:00+00:00");

        let with_offset = parse_stored_timestamp("2024-11-28T12:00:00+05:30");
        assert_eq!(with_offset.to_rfc3339(), "2024-11-28T06:30:00+00:00");
    }

    #[test]
    fn test_cache_info_next_refresh() {
        let cache: SourceCache<Payload> = SourceCache::new("info", 600);
        cache.store(Payload { readings: vec![] });
        let info = cache.cache_info();
        assert!(info.is_valid);
        assert!(info.next_refresh_seconds > 590 && info.next_refresh_seconds <= 600);
        assert_eq!(info.ttl_seconds, 600);
    }
}

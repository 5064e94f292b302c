use crate::error::FetchError;
use cached::{Cached, TimedCache};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// On-disk form; carries its own timestamp since file mtimes are not trusted across hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskEntry<V> {
    fetched_at: DateTime<Utc>,
    value: V,
}

impl<V> DiskEntry<V> {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        now - self.fetched_at < ttl
    }
}

/// Per-key TTL cache with at most one fetch in flight per key. Callers asking for a key
/// that is being fetched wait for that fetch instead of starting their own. Failures are
/// never cached.
pub struct TtlCache<V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<TimedCache<String, V>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    disk_dir: Option<PathBuf>,
}

impl<V> TtlCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(TimedCache::with_lifespan(ttl)),
            in_flight: Mutex::new(HashMap::new()),
            disk_dir: None,
        }
    }

    /// Also persist entries under `dir` so separate processes honor the same TTL.
    pub fn with_disk(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        let key = key.to_string();
        if let Some(value) = self.cached(&key).await {
            return Ok(value);
        }

        let flight = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_default().clone()
        };
        let _flight = flight.lock().await;

        // Whoever held the flight before us may have filled the entry.
        if let Some(value) = self.cached(&key).await {
            return Ok(value);
        }

        if let Some(entry) = self.read_disk(&key).await {
            if entry.is_fresh(self.ttl, Utc::now()) {
                tracing::debug!(cache = self.name, key = %key, "cache hit on disk");
                return Ok(entry.value);
            }
        }

        tracing::debug!(cache = self.name, key = %key, "cache miss");
        let value = fetch().await?;
        let entry = DiskEntry {
            fetched_at: Utc::now(),
            value: value.clone(),
        };
        self.write_disk(&key, &entry).await;
        self.entries.lock().await.cache_set(key, value.clone());
        Ok(value)
    }

    async fn cached(&self, key: &String) -> Option<V> {
        self.entries.lock().await.cache_get(key).cloned()
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        let dir = self.disk_dir.as_ref()?;
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Some(dir.join(format!("{}-{}.json", self.name, safe)))
    }

    async fn read_disk(&self, key: &str) -> Option<DiskEntry<V>> {
        let path = self.disk_path(key)?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice::<DiskEntry<V>>(&bytes) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable cache file");
                None
            }
        }
    }

    // Disk write failures only cost a refetch later; they are logged, not returned.
    async fn write_disk(&self, key: &str, entry: &DiskEntry<V>) {
        let Some(path) = self.disk_path(key) else {
            return;
        };
        if let Err(err) = write_atomic(&path, entry).await {
            tracing::warn!(path = %path.display(), error = %err, "failed to write cache file");
        }
    }
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn slow_fetch(calls: &AtomicUsize, value: u32) -> Result<u32, FetchError> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(value)
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let cache = Arc::new(TtlCache::<u32>::new("quote", Duration::from_secs(300)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("TSLA", || slow_fetch(&calls, 7))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A different key is fetched separately.
        cache.get_or_fetch("AAPL", || slow_fetch(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_refetches() {
        let cache = TtlCache::<u32>::new("quote", Duration::ZERO);
        let calls = AtomicUsize::new(0);
        cache.get_or_fetch("TSLA", || slow_fetch(&calls, 1)).await.unwrap();
        cache.get_or_fetch("TSLA", || slow_fetch(&calls, 2)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = TtlCache::<u32>::new("quote", Duration::from_secs(300));
        let err = cache
            .get_or_fetch("ZZZZ", || async {
                Err(FetchError::NoData {
                    provider: "test".to_string(),
                    symbol: "ZZZZ".to_string(),
                })
            })
            .await;
        assert!(err.is_err());

        let calls = AtomicUsize::new(0);
        let v = cache.get_or_fetch("ZZZZ", || slow_fetch(&calls, 3)).await.unwrap();
        assert_eq!(v, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disk_layer_survives_a_new_cache_instance() {
        let dir = tempfile::tempdir().unwrap();
        let calls = AtomicUsize::new(0);

        let first = TtlCache::<u32>::new("quote", Duration::from_secs(300)).with_disk(dir.path());
        first.get_or_fetch("BRK.B", || slow_fetch(&calls, 42)).await.unwrap();
        assert!(dir.path().join("quote-BRK.B.json").exists());

        let second = TtlCache::<u32>::new("quote", Duration::from_secs(300)).with_disk(dir.path());
        let v = second.get_or_fetch("BRK.B", || slow_fetch(&calls, 0)).await.unwrap();
        assert_eq!(v, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

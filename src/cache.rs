use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Shared map-with-expiry with single-flight loading.
///
/// `get_or_try_load` guarantees at most one in-flight loader per key; callers
/// that lose the race wait for the winner and read its result from the map.
pub struct TtlCache<K, V> {
    default_ttl: Duration,
    entries: DashMap<K, Entry<V>>,
    inflight: DashMap<K, Arc<Mutex<()>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key)?;
        if hit.expires_at <= Instant::now() {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(hit.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Fetch from the cache or run `load` under the key's single-flight gate.
    ///
    /// The loader returns the value plus an optional TTL override (used for
    /// short-lived negative results). Errors are not cached.
    pub async fn get_or_try_load<E, F, Fut>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, Option<Duration>), E>>,
    {
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }

        let gate = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let _guard = gate.lock().await;

        // A concurrent loader may have filled the entry while we waited.
        if let Some(v) = self.get(&key) {
            self.inflight.remove(&key);
            return Ok(v);
        }

        let result = load().await;
        self.inflight.remove(&key);

        match result {
            Ok((value, ttl)) => {
                self.insert_with_ttl(key, value.clone(), ttl.unwrap_or(self.default_ttl));
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(&"a".into()), Some(1));
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(10));
        cache.insert("a".into(), 1);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get(&"a".into()), None);
    }

    #[tokio::test]
    async fn test_single_flight_loads_once() {
        let cache: Arc<TtlCache<String, u32>> = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_load("k".to_string(), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>((7u32, None))
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_not_cached() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        let r: Result<u32, &str> = cache
            .get_or_try_load("k".to_string(), || async { Err("boom") })
            .await;
        assert!(r.is_err());

        let r: Result<u32, &str> = cache
            .get_or_try_load("k".to_string(), || async { Ok((5, None)) })
            .await;
        assert_eq!(r, Ok(5));
    }

    #[tokio::test]
    async fn test_ttl_override_for_negative_results() {
        let cache: TtlCache<String, Option<u32>> = TtlCache::new(Duration::from_secs(300));
        let r: Result<Option<u32>, ()> = cache
            .get_or_try_load("miss".to_string(), || async {
                Ok((None, Some(Duration::from_millis(10))))
            })
            .await;
        assert_eq!(r, Ok(None));
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get(&"miss".to_string()), None);
    }
}

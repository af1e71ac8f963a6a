use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::store::KeyStore;
use super::types::ApiKeyRow;
use crate::error::AuthResult;

/// TTL for credential lookups.
pub const KEY_CACHE_TTL: Duration = Duration::from_secs(60);

/// TTL for registry auth tokens held by the image-fetch side of the agent.
pub const REGISTRY_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

// ── TtlCache ───────────────────────────────────────────────────

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Bumped by every invalidation. A load that started under an older
    /// epoch does not write its result back.
    epoch: u64,
    last_sweep: Instant,
}

/// Map from key to `{value, expires_at}` with read-through loading.
///
/// The lock is never held while a loader runs, so two concurrent misses on
/// the same key may both load. Expired entries are swept at most once per
/// TTL interval.
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                epoch: 0,
                last_sweep: Instant::now(),
            }),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached value for `key`, if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let inner = self.lock();
        inner.entries.get(key).and_then(|e| {
            if Instant::now() < e.expires_at {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.lock();
        self.put(&mut inner, key, value);
    }

    fn put(&self, inner: &mut Inner<K, V>, key: K, value: V) {
        let now = Instant::now();
        if now.duration_since(inner.last_sweep) >= self.ttl {
            inner.entries.retain(|_, e| now < e.expires_at);
            inner.last_sweep = now;
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Return the cached value or run `load` and cache its result.
    /// Load errors are returned as-is and never cached. A result whose load
    /// overlapped an invalidation is returned but not cached.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> AuthResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<V>>,
    {
        let epoch = {
            let inner = self.lock();
            if let Some(e) = inner.entries.get(&key) {
                if Instant::now() < e.expires_at {
                    return Ok(e.value.clone());
                }
            }
            inner.epoch
        };

        let value = load().await?;

        let mut inner = self.lock();
        if inner.epoch == epoch {
            self.put(&mut inner, key, value.clone());
        }
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.entries.clear();
    }

    /// Drop expired entries.
    pub fn cleanup(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.entries.retain(|_, e| now < e.expires_at);
        inner.last_sweep = now;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── KeyCache ───────────────────────────────────────────────────

type OwnerKey = (u32, Option<String>);

/// Read-through cache over a [`KeyStore`] with two independent keyspaces:
/// by secret, and by `(app_id, service_name)`.
pub struct KeyCache {
    store: Arc<dyn KeyStore>,
    by_secret: TtlCache<String, Option<ApiKeyRow>>,
    by_owner: TtlCache<OwnerKey, Vec<ApiKeyRow>>,
}

impl KeyCache {
    pub fn new(store: Arc<dyn KeyStore>, ttl: Duration) -> Self {
        KeyCache {
            store,
            by_secret: TtlCache::new(ttl),
            by_owner: TtlCache::new(ttl),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Row for `secret`. Absence is cached too.
    pub async fn get_row(&self, secret: &str) -> AuthResult<Option<ApiKeyRow>> {
        let store = self.store.clone();
        self.by_secret
            .get_or_load(secret.to_string(), || async move {
                store.select_by_secret(secret).await
            })
            .await
    }

    pub async fn get_rows(
        &self,
        app_id: u32,
        service_name: Option<&str>,
    ) -> AuthResult<Vec<ApiKeyRow>> {
        let store = self.store.clone();
        self.by_owner
            .get_or_load((app_id, service_name.map(String::from)), || async move {
                store.select_by_owner_service(app_id, service_name).await
            })
            .await
    }

    pub fn invalidate_secret(&self, secret: &str) {
        self.by_secret.invalidate(&secret.to_string());
    }

    pub fn invalidate_owner(&self, app_id: u32, service_name: Option<&str>) {
        self.by_owner
            .invalidate(&(app_id, service_name.map(String::from)));
    }

    pub fn clear(&self) {
        self.by_secret.clear();
        self.by_owner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_keys::store::SqliteKeyStore;
    use crate::api_keys::types::NewApiKey;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a real store and counts reads.
    struct CountingStore {
        inner: SqliteKeyStore,
        reads: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Arc<Self> {
            Arc::new(CountingStore {
                inner: SqliteKeyStore::open_in_memory().unwrap(),
                reads: AtomicUsize::new(0),
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeyStore for CountingStore {
        async fn insert(&self, key: NewApiKey) -> AuthResult<()> {
            self.inner.insert(key).await
        }

        async fn delete(&self, app_id: u32, service_name: Option<&str>) -> AuthResult<()> {
            self.inner.delete(app_id, service_name).await
        }

        async fn select_by_secret(&self, secret: &str) -> AuthResult<Option<ApiKeyRow>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.select_by_secret(secret).await
        }

        async fn select_by_owner_service(
            &self,
            app_id: u32,
            service_name: Option<&str>,
        ) -> AuthResult<Vec<ApiKeyRow>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.select_by_owner_service(app_id, service_name).await
        }
    }

    fn key(app_id: u32, service: &str, secret: &str) -> NewApiKey {
        NewApiKey {
            app_id,
            service_name: Some(service.into()),
            key: secret.into(),
            scopes: "[]".into(),
        }
    }

    #[test]
    fn ttl_cache_expires_entries() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn ttl_cache_cleanup_removes_expired() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("a", 1);
        cache.insert("b", 2);
        std::thread::sleep(Duration::from_millis(10));
        cache.cleanup();
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_cache_invalidate_before_expiry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn insert_sweeps_expired_entries_once_per_ttl() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(20));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(30));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[tokio::test]
    async fn load_overlapping_invalidation_is_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let load = cache.get_or_load("a", || async move {
            let _ = rx.await;
            Ok(1)
        });
        let invalidate = async {
            cache.invalidate(&"a");
            let _ = tx.send(());
        };
        let (loaded, ()) = tokio::join!(load, invalidate);

        assert_eq!(loaded.unwrap(), 1);
        assert_eq!(cache.get(&"a"), None);

        // Loads that start after the invalidation cache normally.
        cache.get_or_load("a", || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[tokio::test]
    async fn load_errors_are_not_cached() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_load("a", || async { Err(crate::error::AuthError::Other("down".into())) })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.get(&"a"), None);

        let ok = cache.get_or_load("a", || async { Ok(5) }).await.unwrap();
        assert_eq!(ok, 5);
    }

    #[tokio::test]
    async fn hit_does_not_touch_store() {
        let store = CountingStore::new();
        store.insert(key(7, "main", "s1")).await.unwrap();
        let cache = KeyCache::new(store.clone(), KEY_CACHE_TTL);

        let first = cache.get_row("s1").await.unwrap();
        let second = cache.get_row("s1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn absence_is_cached() {
        let store = CountingStore::new();
        let cache = KeyCache::new(store.clone(), KEY_CACHE_TTL);

        assert!(cache.get_row("missing").await.unwrap().is_none());
        assert!(cache.get_row("missing").await.unwrap().is_none());
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn keyspaces_are_independent() {
        let store = CountingStore::new();
        store.insert(key(7, "main", "s1")).await.unwrap();
        let cache = KeyCache::new(store.clone(), KEY_CACHE_TTL);

        cache.get_row("s1").await.unwrap();
        cache.get_rows(7, Some("main")).await.unwrap();
        assert_eq!(store.reads(), 2);

        cache.invalidate_owner(7, Some("main"));
        cache.get_row("s1").await.unwrap();
        assert_eq!(store.reads(), 2, "by-secret entry should survive");

        cache.get_rows(7, Some("main")).await.unwrap();
        assert_eq!(store.reads(), 3);
    }

    #[tokio::test]
    async fn invalidate_secret_forces_reload() {
        let store = CountingStore::new();
        store.insert(key(7, "main", "s1")).await.unwrap();
        let cache = KeyCache::new(store.clone(), KEY_CACHE_TTL);

        cache.get_row("s1").await.unwrap();
        store.delete(7, Some("main")).await.unwrap();
        assert!(cache.get_row("s1").await.unwrap().is_some(), "stale until invalidated");

        cache.invalidate_secret("s1");
        assert!(cache.get_row("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expiry_rereads_store() {
        let store = CountingStore::new();
        store.insert(key(7, "main", "s1")).await.unwrap();
        let cache = KeyCache::new(store.clone(), Duration::from_millis(5));

        cache.get_rows(7, Some("main")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.get_rows(7, Some("main")).await.unwrap();
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn clear_drops_everything_without_losing_data() {
        let store = CountingStore::new();
        store.insert(key(7, "main", "s1")).await.unwrap();
        let cache = KeyCache::new(store.clone(), KEY_CACHE_TTL);

        cache.get_row("s1").await.unwrap();
        cache.clear();
        let row = cache.get_row("s1").await.unwrap().unwrap();
        assert_eq!(row.key, "s1");
        assert_eq!(store.reads(), 2);
    }
}

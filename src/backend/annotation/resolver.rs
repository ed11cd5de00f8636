//! Cached dashboard UID to ID resolution.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::HistorianError;

/// Looks up dashboards by UID.
#[async_trait]
pub trait DashboardStore: Send + Sync + fmt::Debug {
    /// Returns the numeric ID of dashboard `uid` in `org_id`, or `None` if
    /// there is no such dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn get_dashboard_id(&self, org_id: i64, uid: &str) -> Result<Option<i64>, HistorianError>;
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    /// `None` caches a missing dashboard.
    id: Option<i64>,
    expires_at: Instant,
}

/// Resolves dashboard UIDs to numeric IDs through a read-through cache.
///
/// Hits are served without locking. Misses take a single lock and check
/// the cache again before asking the store, so concurrent misses for one
/// key cause one lookup. Missing dashboards are cached too.
#[derive(Debug)]
pub struct DashboardResolver {
    store: Arc<dyn DashboardStore>,
    cache: DashMap<String, CacheEntry>,
    lookup: Mutex<()>,
    ttl: Duration,
}

impl DashboardResolver {
    /// Creates a resolver whose entries live for `ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn DashboardStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            lookup: Mutex::new(()),
            ttl,
        }
    }

    /// Returns the ID of dashboard `uid` in `org_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::Store`] if the dashboard does not exist or
    /// the store lookup fails. Failed lookups are not cached.
    pub async fn get_id(&self, org_id: i64, uid: &str) -> Result<i64, HistorianError> {
        let key = format!("{org_id}{uid}");
        if let Some(id) = self.cached(&key) {
            return found(id, org_id, uid);
        }

        let _guard = self.lookup.lock().await;
        if let Some(id) = self.cached(&key) {
            return found(id, org_id, uid);
        }

        let id = self.store.get_dashboard_id(org_id, uid).await?;
        self.cache.insert(
            key,
            CacheEntry {
                id,
                expires_at: Instant::now() + self.ttl,
            },
        );
        found(id, org_id, uid)
    }

    /// Number of cached entries, expired ones included.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Returns the cached lookup for `key` if it has not expired.
    fn cached(&self, key: &str) -> Option<Option<i64>> {
        let now = Instant::now();
        let entry = *self.cache.get(key)?;
        if entry.expires_at > now {
            return Some(entry.id);
        }
        self.evict_expired(key, now);
        None
    }

    /// Drops the entry for `key` only if it is still expired at `now`. An
    /// entry refreshed by a concurrent lookup is kept.
    fn evict_expired(&self, key: &str, now: Instant) {
        self.cache.remove_if(key, |_, entry| entry.expires_at <= now);
    }
}

fn found(id: Option<i64>, org_id: i64, uid: &str) -> Result<i64, HistorianError> {
    id.ok_or_else(|| HistorianError::Store(format!("dashboard {uid} not found in org {org_id}")))
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Dashboards by `(org, uid)`, counting lookups.
    #[derive(Debug, Default)]
    pub(crate) struct FakeDashboards {
        pub(crate) dashboards: HashMap<(i64, String), i64>,
        pub(crate) lookups: AtomicUsize,
        pub(crate) fail: bool,
        pub(crate) delay: Option<Duration>,
    }

    impl FakeDashboards {
        pub(crate) fn with(org_id: i64, uid: &str, id: i64) -> Self {
            let mut dashboards = HashMap::new();
            dashboards.insert((org_id, uid.to_string()), id);
            Self {
                dashboards,
                ..Self::default()
            }
        }

        pub(crate) fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DashboardStore for FakeDashboards {
        async fn get_dashboard_id(&self, org_id: i64, uid: &str) -> Result<Option<i64>, HistorianError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(HistorianError::Store("dashboard store unavailable".to_string()));
            }
            Ok(self.dashboards.get(&(org_id, uid.to_string())).copied())
        }
    }

    fn resolver(store: &Arc<FakeDashboards>, ttl: Duration) -> DashboardResolver {
        DashboardResolver::new(Arc::clone(store) as Arc<dyn DashboardStore>, ttl)
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let store = Arc::new(FakeDashboards::with(1, "dash-1", 77));
        let resolver = resolver(&store, Duration::from_secs(60));

        assert!(matches!(resolver.get_id(1, "dash-1").await, Ok(77)));
        assert!(matches!(resolver.get_id(1, "dash-1").await, Ok(77)));
        assert_eq!(store.lookups(), 1);
        assert_eq!(resolver.cached_entries(), 1);
    }

    #[tokio::test]
    async fn not_found_is_cached() {
        let store = Arc::new(FakeDashboards::default());
        let resolver = resolver(&store, Duration::from_secs(60));

        assert!(matches!(resolver.get_id(1, "gone").await, Err(HistorianError::Store(_))));
        assert!(matches!(resolver.get_id(1, "gone").await, Err(HistorianError::Store(_))));
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn store_failures_are_not_cached() {
        let store = Arc::new(FakeDashboards {
            fail: true,
            ..FakeDashboards::default()
        });
        let resolver = resolver(&store, Duration::from_secs(60));

        assert!(resolver.get_id(1, "dash-1").await.is_err());
        assert!(resolver.get_id(1, "dash-1").await.is_err());
        assert_eq!(store.lookups(), 2);
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn expired_entries_are_looked_up_again() {
        let store = Arc::new(FakeDashboards::with(1, "dash-1", 77));
        let resolver = resolver(&store, Duration::ZERO);

        assert!(resolver.get_id(1, "dash-1").await.is_ok());
        assert!(resolver.get_id(1, "dash-1").await.is_ok());
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn eviction_keeps_a_refreshed_entry() {
        let store = Arc::new(FakeDashboards::with(1, "dash-1", 77));
        let resolver = resolver(&store, Duration::from_secs(60));
        let stale_read = Instant::now();

        assert!(matches!(resolver.get_id(1, "dash-1").await, Ok(77)));
        resolver.evict_expired("1dash-1", stale_read);
        assert_eq!(resolver.cached_entries(), 1);
        assert!(matches!(resolver.get_id(1, "dash-1").await, Ok(77)));
        assert_eq!(store.lookups(), 1);

        resolver.evict_expired("1dash-1", Instant::now() + Duration::from_secs(120));
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_lookup() {
        let store = Arc::new(FakeDashboards {
            delay: Some(Duration::from_millis(20)),
            ..FakeDashboards::with(1, "dash-1", 77)
        });
        let resolver = Arc::new(resolver(&store, Duration::from_secs(60)));

        let tasks = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.get_id(1, "dash-1").await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            assert!(matches!(task.await, Ok(Ok(77))));
        }
        assert_eq!(store.lookups(), 1);
    }
}

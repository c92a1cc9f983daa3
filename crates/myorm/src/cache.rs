//! Result cache used by [`Connection::execute`](crate::Connection::execute).
//!
//! The cache stores whole result sets under caller-chosen keys. Implementations
//! decide whether concurrent misses for the same key are collapsed into a single
//! computation; [`MokaResultCache`] guarantees it.

use crate::error::DbResult;
use crate::row::Row;
use futures_core::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// A cached result set.
pub type CachedRows = Arc<Vec<Row>>;

/// Fetch-or-compute cache for result sets.
pub trait ResultCache: Send + Sync {
    /// Return the cached rows for `key`, or run `compute`, store its rows for `ttl`
    /// and return them. Errors from `compute` are returned and not cached.
    fn get_with<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        compute: BoxFuture<'a, DbResult<CachedRows>>,
    ) -> BoxFuture<'a, DbResult<CachedRows>>;

    /// Evict `key`.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;
}

#[cfg(feature = "cache")]
pub use self::moka_cache::MokaResultCache;

#[cfg(feature = "cache")]
mod moka_cache {
    use super::{CachedRows, ResultCache};
    use crate::error::{DbError, DbResult};
    use futures_core::future::BoxFuture;
    use moka::Expiry;
    use moka::future::Cache;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Clone)]
    struct Entry {
        rows: CachedRows,
        ttl: Duration,
    }

    struct EntryExpiry;

    impl Expiry<String, Entry> for EntryExpiry {
        fn expire_after_create(
            &self,
            _key: &String,
            value: &Entry,
            _created_at: Instant,
        ) -> Option<Duration> {
            Some(value.ttl)
        }
    }

    /// In-process cache backed by `moka`, with a TTL per entry.
    ///
    /// Concurrent misses on one key run `compute` once; the other callers wait
    /// for and share its result.
    #[derive(Clone)]
    pub struct MokaResultCache {
        inner: Cache<String, Entry>,
    }

    impl MokaResultCache {
        /// Create a cache holding at most `max_entries` result sets.
        pub fn new(max_entries: u64) -> Self {
            Self {
                inner: Cache::builder()
                    .max_capacity(max_entries)
                    .expire_after(EntryExpiry)
                    .build(),
            }
        }

        /// Whether `key` is currently cached.
        pub fn contains(&self, key: &str) -> bool {
            self.inner.contains_key(key)
        }
    }

    impl Default for MokaResultCache {
        fn default() -> Self {
            Self::new(10_000)
        }
    }

    impl ResultCache for MokaResultCache {
        fn get_with<'a>(
            &'a self,
            key: &'a str,
            ttl: Duration,
            compute: BoxFuture<'a, DbResult<CachedRows>>,
        ) -> BoxFuture<'a, DbResult<CachedRows>> {
            Box::pin(async move {
                let init = async move { compute.await.map(|rows| Entry { rows, ttl }) };
                self.inner
                    .try_get_with(key.to_string(), init)
                    .await
                    .map(|entry| entry.rows)
                    .map_err(unshare_error)
            })
        }

        fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.inner.invalidate(key).await;
            })
        }
    }

    /// Waiters on a failed computation all receive the same `Arc`'d error.
    fn unshare_error(err: Arc<DbError>) -> DbError {
        Arc::unwrap_or_clone(err)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::row::Row;
        use futures_util::future::join_all;
        use std::sync::atomic::{AtomicUsize, Ordering};

        fn rows(n: i64) -> CachedRows {
            Arc::new(vec![Row::from_pairs([("n", n)])])
        }

        #[tokio::test]
        async fn test_fetch_or_compute() {
            let cache = MokaResultCache::default();
            let calls = AtomicUsize::new(0);

            for _ in 0..3 {
                let got = cache
                    .get_with(
                        "k",
                        Duration::from_secs(60),
                        Box::pin(async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(rows(1))
                        }),
                    )
                    .await
                    .unwrap();
                assert_eq!(got.len(), 1);
            }
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert!(cache.contains("k"));

            cache.delete("k").await;
            assert!(!cache.contains("k"));
        }

        #[tokio::test]
        async fn test_errors_are_not_cached() {
            let cache = MokaResultCache::default();
            let err = cache
                .get_with(
                    "k",
                    Duration::from_secs(60),
                    Box::pin(async { Err(DbError::config("nope")) }),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::Config(_)));
            assert!(!cache.contains("k"));
        }

        #[tokio::test]
        async fn test_entry_expires_after_ttl() {
            let cache = MokaResultCache::default();
            cache
                .get_with("k", Duration::from_millis(50), Box::pin(async { Ok(rows(1)) }))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(120)).await;

            let calls = AtomicUsize::new(0);
            cache
                .get_with(
                    "k",
                    Duration::from_secs(60),
                    Box::pin(async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(rows(2))
                    }),
                )
                .await
                .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn test_single_flight_per_key() {
            let cache = Arc::new(MokaResultCache::default());
            let calls = Arc::new(AtomicUsize::new(0));

            let handles = (0..8).map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_with(
                            "shared",
                            Duration::from_secs(60),
                            Box::pin(async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(50)).await;
                                Ok(rows(7))
                            }),
                        )
                        .await
                        .map(|r| r.len())
                })
            });
            for joined in join_all(handles).await {
                assert_eq!(joined.unwrap().unwrap(), 1);
            }
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}

//! The cache and fan-out half of component D: a TTL cache with
//! single-flight discipline on miss, plus the two bounded worker pools used
//! to prune directories whose listing would be empty.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

enum Slot<V> {
    Ready(CacheEntry<V>),
    /// A fetch for this key is already in flight; waiters subscribe to the
    /// `Notify` and re-check the map once woken.
    InFlight(Arc<Notify>),
}

/// A single-producer TTL cache keyed on an arbitrary hashable key.
/// Concurrent misses on the same key block on one fetch rather than each
/// issuing their own request (spec's "shared state discipline").
pub struct TtlCache<K, V> {
    ttl: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, refreshing it via `fetch` if
    /// absent or expired. Lazy expiry: no background sweep, checked here on
    /// access.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let mut slots = self.slots.lock().await;
            match slots.get(&key) {
                Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                    return Ok(entry.value.clone());
                }
                Some(Slot::InFlight(notify)) => {
                    // Register interest in the notification *while the lock is
                    // still held*. `notify_waiters()` only wakes waiters that
                    // already polled or `enable()`d their `Notified` future;
                    // dropping the lock and calling `notified().await` after
                    // would leave a window where a producer finishing in
                    // between is never observed (lost wakeup).
                    let notify = notify.clone();
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    drop(slots);
                    notified.await;
                    continue;
                }
                _ => {
                    slots.insert(key.clone(), Slot::InFlight(Arc::new(Notify::new())));
                }
            }
            drop(slots);

            let result = fetch().await;
            let mut slots = self.slots.lock().await;
            let waiter = match slots.remove(&key) {
                Some(Slot::InFlight(notify)) => notify,
                _ => Arc::new(Notify::new()),
            };
            match &result {
                Ok(value) => {
                    slots.insert(
                        key.clone(),
                        Slot::Ready(CacheEntry {
                            value: value.clone(),
                            expires_at: Instant::now() + self.ttl,
                        }),
                    );
                }
                Err(_) => {
                    slots.remove(&key);
                }
            }
            drop(slots);
            waiter.notify_waiters();
            return result;
        }
    }
}

/// Runs `task` over `items` with at most `max_parallel` concurrently in
/// flight, preserving input order in the returned vector.
pub async fn bounded_fan_out<T, R, F, Fut>(items: Vec<T>, max_parallel: usize, task: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = R> + Send,
{
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let permit = semaphore.clone();
        let task = task.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore not closed");
            task(item).await
        }));
    }
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.expect("fan-out task panicked"));
    }
    results
}

/// Drops candidate directory entries whose children turn out empty.
/// `get_children` runs in parallel via `bounded_fan_out`; callers pick the
/// concurrency cap per call site — wide for resource-group pruning
/// (documented smell, see design notes), `max_parallel_requests` for
/// per-kind pruning.
pub struct EmptyPruner;

impl EmptyPruner {
    pub async fn prune<T, F, Fut>(candidates: Vec<T>, max_parallel: usize, has_children: F) -> Vec<T>
    where
        T: Send + 'static + Clone,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let flags = bounded_fan_out(candidates.clone(), max_parallel, has_children).await;
        candidates
            .into_iter()
            .zip(flags)
            .filter_map(|(item, keep)| keep.then_some(item))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn caches_value_until_ttl_expires() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let first: Result<u32, ()> = cache
            .get_or_fetch("k", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;
        assert_eq!(first.unwrap(), 1);

        let c = calls.clone();
        let second: Result<u32, ()> = cache
            .get_or_fetch("k", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await;
        assert_eq!(second.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let c = calls.clone();
        let third: Result<u32, ()> = cache
            .get_or_fetch("k", || async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(3)
            })
            .await;
        assert_eq!(third.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_single_flight() {
        let cache: Arc<TtlCache<&str, u32>> = Arc::new(TtlCache::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, ()>(42)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_fan_out_preserves_order() {
        let items: Vec<u32> = (0..20).collect();
        let results = bounded_fan_out(items.clone(), 4, |n| async move { n * 2 }).await;
        let expected: Vec<u32> = items.iter().map(|n| n * 2).collect();
        assert_eq!(results, expected);
    }

    #[tokio::test]
    async fn prune_drops_empty_candidates() {
        let candidates = vec!["a", "b", "c"];
        let kept = EmptyPruner::prune(candidates, 20, |c| async move { c != "b" }).await;
        assert_eq!(kept, vec!["a", "c"]);
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Idle entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 256;

/// Per-storage-key async mutexes. Holding a [`KeyGuard`] gives exclusive
/// write access to the content file and the record that references it.
#[derive(Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Releases its keys on drop.
pub struct KeyGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.lock_all(&[key]).await
    }

    /// Lock several keys. Keys are acquired in sorted order so two callers
    /// locking overlapping sets cannot deadlock.
    pub async fn lock_all(&self, keys: &[&str]) -> KeyGuard {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.iter()
                .map(|key| Arc::clone(map.entry((*key).to_string()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        KeyGuard { _guards: guards }
    }

    /// Number of tracked keys (idle ones included until pruned).
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("shared").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.lock("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_overlapping_sets_complete() {
        let locks = Arc::new(KeyLocks::new());
        let l1 = Arc::clone(&locks);
        let l2 = Arc::clone(&locks);

        let t1 = tokio::spawn(async move {
            for _ in 0..50 {
                let _g = l1.lock_all(&["x", "y"]).await;
                tokio::task::yield_now().await;
            }
        });
        let t2 = tokio::spawn(async move {
            for _ in 0..50 {
                let _g = l2.lock_all(&["y", "x"]).await;
                tokio::task::yield_now().await;
            }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            t1.await.unwrap();
            t2.await.unwrap();
        })
        .await
        .expect("lock ordering deadlocked");
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_one_call() {
        let locks = KeyLocks::new();
        let _g = locks.lock_all(&["k", "k"]).await;
        assert_eq!(locks.tracked(), 1);
    }
}

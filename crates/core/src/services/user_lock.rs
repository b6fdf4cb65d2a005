//! Per-user mutual exclusion.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use reelcap_common::UserId;
use tokio::sync::{Mutex, RwLock};

/// Keyed registry of per-user locks.
///
/// Locks are created on first use and never removed. Waiters on the same
/// user are served in arrival order; different users never contend.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<RwLock<HashMap<UserId, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(&user_id) {
            return Arc::clone(lock);
        }

        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(user_id).or_default())
    }

    /// Run `f` while holding the lock of `user_id`.
    ///
    /// The lock is released when `f` completes, fails, panics or is dropped.
    pub async fn with_lock<F, Fut, T>(&self, user_id: UserId, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock_owned().await;
        f().await
    }

    /// Number of users that have a lock.
    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    /// Whether no lock was created yet.
    pub async fn is_empty(&self) -> bool {
        self.locks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_user_is_serialized() {
        let locks = UserLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                tokio::spawn(async move {
                    locks
                        .with_lock(UserId::new(1), || async {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn test_different_users_do_not_contend() {
        let locks = UserLocks::new();

        let result = locks
            .with_lock(UserId::new(1), || async {
                // Holding user 1 must not block user 2.
                locks.with_lock(UserId::new(2), || async { 42 }).await
            })
            .await;

        assert_eq!(result, 42);
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_lock_released_after_error() {
        let locks = UserLocks::new();

        let failed: Result<(), &str> = locks
            .with_lock(UserId::new(5), || async { Err("write failed") })
            .await;
        assert!(failed.is_err());

        let next = tokio::time::timeout(
            Duration::from_secs(1),
            locks.with_lock(UserId::new(5), || async { "acquired" }),
        )
        .await;
        assert_eq!(next.unwrap(), "acquired");
    }

    async fn explode() {
        panic!("boom");
    }

    #[tokio::test]
    async fn test_lock_released_after_panic() {
        let locks = UserLocks::new();

        let panicking = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.with_lock(UserId::new(6), explode).await })
        };
        assert!(panicking.await.is_err());

        let next = tokio::time::timeout(
            Duration::from_secs(1),
            locks.with_lock(UserId::new(6), || async { 1 }),
        )
        .await;
        assert_eq!(next.unwrap(), 1);
    }
}

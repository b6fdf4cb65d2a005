//! Backend selection with fallback to the file store.
//!
//! [`FallbackStore`] serves every operation from the relational backend
//! until that backend reports itself unreachable. At that point it seeds the
//! file backend with the last state it saw for each user and serves from the
//! file backend for the rest of the process lifetime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reelcap_common::{
    AppError, AppResult, SharedStateStore, StateStore, UploadCounts, UploadRecord, UserId,
    UserProgression,
};
use tokio::sync::{Mutex, RwLock};

/// State store that degrades from a primary to a secondary backend.
pub struct FallbackStore {
    primary: Option<SharedStateStore>,
    secondary: SharedStateStore,
    degraded: AtomicBool,
    last_known: Mutex<HashMap<UserId, UserProgression>>,
    /// Held shared by primary operations and exclusively by the switch, so
    /// no primary result is acknowledged after the seed snapshot is taken.
    switch: RwLock<()>,
}

impl FallbackStore {
    /// Serve from `primary`, falling back to `secondary` once it is unreachable.
    #[must_use]
    pub fn new(primary: SharedStateStore, secondary: SharedStateStore) -> Self {
        Self {
            primary: Some(primary),
            secondary,
            degraded: AtomicBool::new(false),
            last_known: Mutex::new(HashMap::new()),
            switch: RwLock::new(()),
        }
    }

    /// Serve from `secondary` only, for when the primary was unreachable at startup.
    #[must_use]
    pub fn degraded(secondary: SharedStateStore) -> Self {
        Self {
            primary: None,
            secondary,
            degraded: AtomicBool::new(true),
            last_known: Mutex::new(HashMap::new()),
            switch: RwLock::new(()),
        }
    }

    /// Whether the secondary backend is serving.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn active_primary(&self) -> Option<&SharedStateStore> {
        if self.is_degraded() {
            None
        } else {
            self.primary.as_ref()
        }
    }

    /// Switch to the secondary backend, carrying over the last known state.
    ///
    /// Waits for in-flight primary operations. Seeding failures propagate and
    /// leave the primary selected.
    async fn fall_back(&self, cause: &AppError) -> AppResult<()> {
        let _switch = self.switch.write().await;
        if self.is_degraded() {
            return Ok(());
        }

        tracing::warn!(
            error = %cause,
            from = self.primary.as_ref().map_or("none", |p| p.backend_name()),
            to = self.secondary.backend_name(),
            "Primary storage unreachable, switching backend"
        );

        let snapshot: Vec<UserProgression> =
            self.last_known.lock().await.values().cloned().collect();
        for progression in &snapshot {
            self.secondary.write(progression).await?;
        }

        self.degraded.store(true, Ordering::Release);
        tracing::info!(
            seeded_users = snapshot.len(),
            backend = self.secondary.backend_name(),
            "Storage fallback complete"
        );
        Ok(())
    }

    /// Run `op` on the primary, retrying on the secondary if it is unreachable.
    ///
    /// `seen` picks the progression a successful primary result confirms; it
    /// is recorded before the result is returned.
    async fn route<'a, T, F, Fut, S>(&'a self, op: F, seen: S) -> AppResult<T>
    where
        F: Fn(&'a dyn StateStore) -> Fut,
        Fut: Future<Output = AppResult<T>> + 'a,
        S: FnOnce(&T) -> Option<UserProgression>,
    {
        if let Some(primary) = self.primary.as_ref() {
            let switch = self.switch.read().await;
            if !self.is_degraded() {
                match op(primary.as_ref()).await {
                    Ok(value) => {
                        if let Some(progression) = seen(&value) {
                            self.last_known
                                .lock()
                                .await
                                .insert(progression.user_id, progression);
                        }
                        return Ok(value);
                    }
                    Err(e) if e.is_unavailable() => {
                        drop(switch);
                        self.fall_back(&e).await?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        op(self.secondary.as_ref()).await
    }
}

const fn untracked<T>(_: &T) -> Option<UserProgression> {
    None
}

#[async_trait]
impl StateStore for FallbackStore {
    async fn read(&self, user_id: UserId) -> AppResult<UserProgression> {
        self.route(
            |store| store.read(user_id),
            |p: &UserProgression| Some(p.clone()),
        )
        .await
    }

    async fn write(&self, progression: &UserProgression) -> AppResult<()> {
        self.route(
            |store| store.write(progression),
            |_: &()| Some(progression.clone()),
        )
        .await
    }

    async fn append_history(&self, record: &UploadRecord) -> AppResult<()> {
        self.route(|store| store.append_history(record), untracked).await
    }

    async fn count_users(&self) -> AppResult<u64> {
        self.route(|store| store.count_users(), untracked).await
    }

    async fn daily_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        self.route(|store| store.daily_upload_count(user_id), untracked).await
    }

    async fn total_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        self.route(|store| store.total_upload_count(user_id), untracked).await
    }

    async fn global_upload_counts(&self) -> AppResult<UploadCounts> {
        self.route(|store| store.global_upload_counts(), untracked).await
    }

    fn backend_name(&self) -> &'static str {
        match self.active_primary() {
            Some(primary) => primary.backend_name(),
            None => self.secondary.backend_name(),
        }
    }
}

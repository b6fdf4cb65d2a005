//! State store contract.
//!
//! Every persistence backend implements [`StateStore`]. Callers hold a
//! [`SharedStateStore`] and never learn which backend is serving them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::id::UserId;
use crate::progression::{UploadCounts, UploadRecord, UserProgression, start_of_today};
use crate::AppResult;

/// Persistence of per-user progression and upload history.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a user's progression.
    ///
    /// A user without a record gets the default record, which is persisted
    /// so that repeated reads return the same value.
    async fn read(&self, user_id: UserId) -> AppResult<UserProgression>;

    /// Replace the stored progression of `progression.user_id`.
    ///
    /// The write is all-or-nothing.
    async fn write(&self, progression: &UserProgression) -> AppResult<()>;

    /// Append an upload to the history.
    async fn append_history(&self, record: &UploadRecord) -> AppResult<()>;

    /// Number of users with a stored progression.
    async fn count_users(&self) -> AppResult<u64>;

    /// Uploads of a user since 00:00 UTC today.
    async fn daily_upload_count(&self, user_id: UserId) -> AppResult<u64>;

    /// Uploads of a user ever recorded.
    async fn total_upload_count(&self, user_id: UserId) -> AppResult<u64>;

    /// Upload counters across all users.
    async fn global_upload_counts(&self) -> AppResult<UploadCounts>;

    /// Short name of the backend, for status output and logs.
    fn backend_name(&self) -> &'static str;
}

/// Type alias for the shared state store.
pub type SharedStateStore = Arc<dyn StateStore>;

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, UserProgression>,
    uploads: Vec<UploadRecord>,
}

/// In-memory state store for tests or ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded uploads, oldest first.
    pub async fn history(&self) -> Vec<UploadRecord> {
        self.state.read().await.uploads.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, user_id: UserId) -> AppResult<UserProgression> {
        if let Some(progression) = self.state.read().await.users.get(&user_id) {
            return Ok(progression.clone());
        }

        let mut state = self.state.write().await;
        Ok(state
            .users
            .entry(user_id)
            .or_insert_with(|| UserProgression::new(user_id))
            .clone())
    }

    async fn write(&self, progression: &UserProgression) -> AppResult<()> {
        self.state
            .write()
            .await
            .users
            .insert(progression.user_id, progression.clone());
        Ok(())
    }

    async fn append_history(&self, record: &UploadRecord) -> AppResult<()> {
        self.state.write().await.uploads.push(record.clone());
        Ok(())
    }

    async fn count_users(&self) -> AppResult<u64> {
        Ok(self.state.read().await.users.len() as u64)
    }

    async fn daily_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        let since = start_of_today();
        let state = self.state.read().await;
        Ok(state
            .uploads
            .iter()
            .filter(|r| r.user_id == user_id && r.uploaded_at >= since)
            .count() as u64)
    }

    async fn total_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        let state = self.state.read().await;
        Ok(state.uploads.iter().filter(|r| r.user_id == user_id).count() as u64)
    }

    async fn global_upload_counts(&self) -> AppResult<UploadCounts> {
        let since = start_of_today();
        let state = self.state.read().await;
        Ok(UploadCounts {
            daily: state.uploads.iter().filter(|r| r.uploaded_at >= since).count() as u64,
            total: state.uploads.len() as u64,
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

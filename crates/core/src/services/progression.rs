//! Progression engine.
//!
//! Applies uploads and setting changes to a user's [`UserProgression`]. Every
//! mutation of one user runs under that user's lock, so a user's operations
//! are totally ordered while different users proceed in parallel.

use std::collections::HashSet;

use reelcap_common::{
    AppError, AppResult, ChannelId, SharedStateStore, UploadCounts, UploadRecord, UserId,
    UserProgression,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user_lock::UserLocks;
use crate::caption::{self, CaptionValues};
use crate::quality;

/// Longest accepted quality label.
const MAX_QUALITY_LABEL: usize = 32;

/// Input for setting the caption template.
#[derive(Debug, Deserialize, Validate)]
pub struct CaptionInput {
    #[validate(length(min = 1, max = 1024))]
    pub template: String,
}

/// Input for setting a season or episode counter.
#[derive(Debug, Deserialize, Validate)]
pub struct CounterInput {
    #[validate(range(max = 9999))]
    pub value: u32,
}

/// Input for selecting qualities.
#[derive(Debug, Deserialize, Validate)]
pub struct QualitiesInput {
    #[validate(length(max = 16))]
    pub qualities: Vec<String>,
}

/// Request handed to the transport after an upload was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardRequest {
    pub user_id: UserId,
    pub target_channel_id: ChannelId,
    pub file_ref: String,
    pub caption: String,
    pub quality: String,
    /// Season and episode the caption was rendered with.
    pub season: u32,
    pub episode: u32,
    /// 1-based position of this upload within the quality cycle.
    pub position: u32,
    pub cycle_length: u32,
    /// Whether this upload completed the cycle and advanced the episode.
    pub episode_advanced: bool,
}

/// A user's own progression and counters.
#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub progression: UserProgression,
    /// Index of the next quality within the selection.
    pub quality_cursor: Option<usize>,
    /// Quality the next upload will receive.
    pub next_quality: Option<String>,
    pub uploads: UploadCounts,
    /// Storage backend currently serving.
    pub backend: &'static str,
}

/// Counters across all users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub users: u64,
    pub daily_uploads: u64,
    pub total_uploads: u64,
}

/// Engine advancing per-user progression.
#[derive(Clone)]
pub struct ProgressionEngine {
    store: SharedStateStore,
    locks: UserLocks,
    allowed_qualities: Vec<String>,
}

impl ProgressionEngine {
    /// Create an engine over `store`.
    ///
    /// `allowed_qualities` is the catalogue users select from. An empty
    /// catalogue accepts any label.
    #[must_use]
    pub fn new(store: SharedStateStore, allowed_qualities: Vec<String>) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
            allowed_qualities,
        }
    }

    /// The store this engine persists to.
    #[must_use]
    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    /// Apply an upload and return what to forward.
    ///
    /// The caption is rendered with the progression as it was before the
    /// upload. Nothing is written when the user has no target channel or no
    /// quality selected. A failed history append is logged and does not fail
    /// the upload.
    pub async fn handle_upload(
        &self,
        user_id: UserId,
        file_ref: String,
    ) -> AppResult<ForwardRequest> {
        self.locks
            .with_lock(user_id, || self.apply_upload(user_id, file_ref))
            .await
    }

    async fn apply_upload(&self, user_id: UserId, file_ref: String) -> AppResult<ForwardRequest> {
        let mut progression = self.store.read(user_id).await?;

        let target_channel_id = progression
            .target_channel_id
            .ok_or(AppError::NoTargetChannel)?;
        let step = quality::next(&progression.selected_qualities, progression.video_count)?;

        let caption = caption::render(
            &progression.caption_template,
            &CaptionValues {
                season: progression.season,
                episode: progression.episode,
                total_episode: progression.total_episode,
                quality: &step.quality,
            },
        );
        let (season, episode) = (progression.season, progression.episode);

        if step.did_wrap_all {
            progression.episode = progression.episode.saturating_add(1);
            progression.video_count = 0;
        } else {
            progression.video_count = step.next_video_count;
        }
        progression.touch();
        self.store.write(&progression).await?;

        let record = UploadRecord {
            user_id,
            season,
            episode,
            total_episode: progression.total_episode,
            quality: step.quality.clone(),
            file_ref: file_ref.clone(),
            rendered_caption: caption.clone(),
            target_channel_id,
            uploaded_at: progression.updated_at,
        };
        if let Err(e) = self.store.append_history(&record).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to record upload history");
        }

        tracing::info!(
            user_id = %user_id,
            season,
            episode,
            quality = %step.quality,
            episode_advanced = step.did_wrap_all,
            "Upload applied"
        );

        Ok(ForwardRequest {
            user_id,
            target_channel_id,
            file_ref,
            caption,
            quality: step.quality,
            season,
            episode,
            position: step.position,
            cycle_length: step.cycle_length,
            episode_advanced: step.did_wrap_all,
        })
    }

    /// Read, modify and write a user's progression under the user's lock.
    async fn update<F>(&self, user_id: UserId, apply: F) -> AppResult<UserProgression>
    where
        F: FnOnce(&mut UserProgression) + Send,
    {
        let store = &self.store;
        self.locks
            .with_lock(user_id, move || async move {
                let mut progression = store.read(user_id).await?;
                apply(&mut progression);
                progression.touch();
                store.write(&progression).await?;
                Ok::<_, AppError>(progression)
            })
            .await
    }

    /// Restart the season at episode 1 with a fresh quality cycle.
    pub async fn reset_episode(&self, user_id: UserId) -> AppResult<UserProgression> {
        let progression = self
            .update(user_id, |p| {
                p.episode = 1;
                p.video_count = 0;
            })
            .await?;
        tracing::info!(user_id = %user_id, "Episode reset");
        Ok(progression)
    }

    /// Set the caption template.
    pub async fn set_caption(&self, user_id: UserId, template: String) -> AppResult<UserProgression> {
        let input = CaptionInput { template };
        input.validate()?;

        self.update(user_id, |p| p.caption_template = input.template)
            .await
    }

    /// Set the current season.
    pub async fn set_season(&self, user_id: UserId, season: u32) -> AppResult<UserProgression> {
        CounterInput { value: season }.validate()?;
        self.update(user_id, |p| p.season = season).await
    }

    /// Set the current episode.
    ///
    /// The quality cycle position is kept.
    pub async fn set_episode(&self, user_id: UserId, episode: u32) -> AppResult<UserProgression> {
        CounterInput { value: episode }.validate()?;
        self.update(user_id, |p| p.episode = episode).await
    }

    /// Set the number of episodes in the season, `0` to unset.
    pub async fn set_total_episode(
        &self,
        user_id: UserId,
        total_episode: u32,
    ) -> AppResult<UserProgression> {
        CounterInput {
            value: total_episode,
        }
        .validate()?;
        self.update(user_id, |p| p.total_episode = total_episode)
            .await
    }

    /// Replace the selected qualities, keeping the given order.
    ///
    /// `video_count` is left as is; an empty selection disables uploads.
    pub async fn set_qualities(
        &self,
        user_id: UserId,
        qualities: Vec<String>,
    ) -> AppResult<UserProgression> {
        let input = QualitiesInput { qualities };
        input.validate()?;
        self.check_qualities(&input.qualities)?;

        self.update(user_id, |p| p.selected_qualities = input.qualities)
            .await
    }

    fn check_qualities(&self, qualities: &[String]) -> AppResult<()> {
        let mut seen = HashSet::new();
        for quality in qualities {
            if quality.trim().is_empty() || quality.chars().count() > MAX_QUALITY_LABEL {
                return Err(AppError::Validation(format!(
                    "Quality label must be 1 to {MAX_QUALITY_LABEL} characters"
                )));
            }
            if !self.allowed_qualities.is_empty() && !self.allowed_qualities.contains(quality) {
                return Err(AppError::Validation(format!("Unknown quality: {quality}")));
            }
            if !seen.insert(quality.as_str()) {
                return Err(AppError::Validation(format!("Duplicate quality: {quality}")));
            }
        }
        Ok(())
    }

    /// Set the channel uploads are forwarded to.
    pub async fn set_target_channel(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> AppResult<UserProgression> {
        if channel_id.get() == 0 {
            return Err(AppError::Validation("Channel id must not be 0".to_string()));
        }
        self.update(user_id, |p| p.target_channel_id = Some(channel_id))
            .await
    }

    /// Unset the target channel, which disables uploads.
    pub async fn clear_target_channel(&self, user_id: UserId) -> AppResult<UserProgression> {
        self.update(user_id, |p| p.target_channel_id = None).await
    }

    /// A user's own progression and upload counters.
    pub async fn status(&self, user_id: UserId) -> AppResult<UserStatus> {
        let progression = self.store.read(user_id).await?;
        let uploads = UploadCounts {
            daily: self.store.daily_upload_count(user_id).await?,
            total: self.store.total_upload_count(user_id).await?,
        };

        Ok(UserStatus {
            quality_cursor: progression.quality_cursor(),
            next_quality: progression.next_quality().map(str::to_string),
            progression,
            uploads,
            backend: self.store.backend_name(),
        })
    }

    /// Counters across all users.
    pub async fn global_stats(&self) -> AppResult<GlobalStats> {
        let users = self.store.count_users().await?;
        let uploads = self.store.global_upload_counts().await?;

        Ok(GlobalStats {
            users,
            daily_uploads: uploads.daily,
            total_uploads: uploads.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reelcap_common::{MemoryStore, StateStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn catalogue() -> Vec<String> {
        ["480p", "720p", "1080p"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    async fn ready_engine(store: SharedStateStore, user: UserId) -> ProgressionEngine {
        let engine = ProgressionEngine::new(store, catalogue());
        engine
            .set_target_channel(user, ChannelId::new(-100_1))
            .await
            .unwrap();
        engine
            .set_qualities(user, labels(&["480p", "720p"]))
            .await
            .unwrap();
        engine
    }

    /// Memory store whose history appends or progression writes can fail.
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryStore,
        fail_history: AtomicBool,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl StateStore for FaultyStore {
        async fn read(&self, user_id: UserId) -> AppResult<UserProgression> {
            self.inner.read(user_id).await
        }

        async fn write(&self, progression: &UserProgression) -> AppResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Storage("disk full".to_string()));
            }
            self.inner.write(progression).await
        }

        async fn append_history(&self, record: &UploadRecord) -> AppResult<()> {
            if self.fail_history.load(Ordering::SeqCst) {
                return Err(AppError::History("history table missing".to_string()));
            }
            self.inner.append_history(record).await
        }

        async fn count_users(&self) -> AppResult<u64> {
            self.inner.count_users().await
        }

        async fn daily_upload_count(&self, user_id: UserId) -> AppResult<u64> {
            self.inner.daily_upload_count(user_id).await
        }

        async fn total_upload_count(&self, user_id: UserId) -> AppResult<u64> {
            self.inner.total_upload_count(user_id).await
        }

        async fn global_upload_counts(&self) -> AppResult<UploadCounts> {
            self.inner.global_upload_counts().await
        }

        fn backend_name(&self) -> &'static str {
            "faulty"
        }
    }

    #[tokio::test]
    async fn test_alternating_qualities_advance_episode() {
        let user = UserId::new(1);
        let engine = ready_engine(Arc::new(MemoryStore::new()), user).await;

        for n in 1..=6u32 {
            let request = engine
                .handle_upload(user, format!("file-{n}"))
                .await
                .unwrap();
            let expected = if n % 2 == 1 { "480p" } else { "720p" };
            assert_eq!(request.quality, expected);
            assert_eq!(request.episode, (n + 1) / 2);
            assert_eq!(request.episode_advanced, n % 2 == 0);
        }

        let p = engine.store().read(user).await.unwrap();
        assert_eq!(p.episode, 4);
        assert_eq!(p.video_count, 0);
    }

    #[tokio::test]
    async fn test_caption_uses_state_before_upload() {
        let user = UserId::new(2);
        let engine = ready_engine(Arc::new(MemoryStore::new()), user).await;
        engine
            .set_caption(user, "S{season}E{episode} [{quality}]".to_string())
            .await
            .unwrap();
        engine.set_season(user, 3).await.unwrap();

        let first = engine.handle_upload(user, "a".to_string()).await.unwrap();
        let second = engine.handle_upload(user, "b".to_string()).await.unwrap();
        let third = engine.handle_upload(user, "c".to_string()).await.unwrap();

        assert_eq!(first.caption, "S03E01 [480p]");
        assert_eq!(second.caption, "S03E01 [720p]");
        assert_eq!(third.caption, "S03E02 [480p]");
        assert_eq!(third.file_ref, "c");
        assert_eq!(third.target_channel_id, ChannelId::new(-100_1));
    }

    #[tokio::test]
    async fn test_upload_without_target_channel_leaves_no_trace() {
        let store = Arc::new(MemoryStore::new());
        let engine = ProgressionEngine::new(store.clone(), catalogue());
        let user = UserId::new(3);
        engine
            .set_qualities(user, labels(&["720p"]))
            .await
            .unwrap();
        let before = store.read(user).await.unwrap();

        let err = engine
            .handle_upload(user, "f".to_string())
            .await
            .unwrap_err();

        assert_eq!(err, AppError::NoTargetChannel);
        assert_eq!(store.read(user).await.unwrap(), before);
        assert!(store.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_qualities_leaves_no_trace() {
        let store = Arc::new(MemoryStore::new());
        let engine = ProgressionEngine::new(store.clone(), catalogue());
        let user = UserId::new(4);
        engine
            .set_target_channel(user, ChannelId::new(-100_4))
            .await
            .unwrap();
        let before = store.read(user).await.unwrap();

        let err = engine
            .handle_upload(user, "f".to_string())
            .await
            .unwrap_err();

        assert_eq!(err, AppError::NoQualitySelected);
        assert_eq!(store.read(user).await.unwrap(), before);
        assert!(store.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_failure_does_not_fail_upload() {
        let store = Arc::new(FaultyStore::default());
        let user = UserId::new(5);
        let engine = ready_engine(store.clone(), user).await;
        store.fail_history.store(true, Ordering::SeqCst);

        let request = engine.handle_upload(user, "f".to_string()).await.unwrap();

        assert_eq!(request.quality, "480p");
        assert_eq!(store.read(user).await.unwrap().video_count, 1);
        assert!(store.inner.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_state_and_releases_lock() {
        let store = Arc::new(FaultyStore::default());
        let user = UserId::new(6);
        let engine = ready_engine(store.clone(), user).await;
        let before = store.read(user).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = engine
            .handle_upload(user, "f".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(store.read(user).await.unwrap(), before);
        assert!(store.inner.history().await.is_empty());

        store.fail_writes.store(false, Ordering::SeqCst);
        let request = engine.handle_upload(user, "f".to_string()).await.unwrap();
        assert_eq!(request.quality, "480p");
    }

    #[tokio::test]
    async fn test_history_record_matches_forward_request() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new(7);
        let engine = ready_engine(store.clone(), user).await;
        engine.set_total_episode(user, 12).await.unwrap();

        let request = engine
            .handle_upload(user, "AgAD".to_string())
            .await
            .unwrap();

        let history = store.history().await;
        assert_eq!(history.len(), 1);
        let record = &history[0];
        assert_eq!(record.quality, request.quality);
        assert_eq!(record.rendered_caption, request.caption);
        assert_eq!(record.file_ref, "AgAD");
        assert_eq!(record.episode, 1);
        assert_eq!(record.total_episode, 12);
        assert_eq!(record.target_channel_id, request.target_channel_id);
    }

    #[tokio::test]
    async fn test_shrinking_qualities_mid_cycle() {
        let store = Arc::new(MemoryStore::new());
        let engine = ProgressionEngine::new(store.clone(), Vec::new());
        let user = UserId::new(8);

        let mut p = UserProgression::new(user);
        p.selected_qualities = labels(&["a", "b", "c"]);
        p.video_count = 4;
        p.target_channel_id = Some(ChannelId::new(-100_8));
        store.write(&p).await.unwrap();

        let updated = engine.set_qualities(user, labels(&["x", "y"])).await.unwrap();
        assert_eq!(updated.video_count, 4);

        let request = engine.handle_upload(user, "f".to_string()).await.unwrap();
        assert_eq!(request.quality, "x");
    }

    #[tokio::test]
    async fn test_reset_episode_keeps_season_and_qualities() {
        let user = UserId::new(9);
        let engine = ready_engine(Arc::new(MemoryStore::new()), user).await;
        engine.set_season(user, 2).await.unwrap();
        engine.set_total_episode(user, 10).await.unwrap();
        engine.set_episode(user, 7).await.unwrap();
        engine.handle_upload(user, "f".to_string()).await.unwrap();

        let p = engine.reset_episode(user).await.unwrap();

        assert_eq!(p.episode, 1);
        assert_eq!(p.video_count, 0);
        assert_eq!(p.season, 2);
        assert_eq!(p.total_episode, 10);
        assert_eq!(p.selected_qualities, labels(&["480p", "720p"]));
    }

    #[tokio::test]
    async fn test_setting_validation() {
        let engine = ProgressionEngine::new(Arc::new(MemoryStore::new()), catalogue());
        let user = UserId::new(10);

        let err = engine.set_caption(user, String::new()).await.unwrap_err();
        assert!(err.is_validation());
        let err = engine
            .set_caption(user, "x".repeat(1025))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(engine.set_caption(user, "é".repeat(1024)).await.is_ok());

        assert!(engine.set_season(user, 10_000).await.unwrap_err().is_validation());
        assert!(engine.set_episode(user, 9999).await.is_ok());

        let err = engine
            .set_qualities(user, labels(&["720p", "720p"]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let err = engine
            .set_qualities(user, labels(&["8K"]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(engine.set_qualities(user, Vec::new()).await.is_ok());

        let err = engine
            .set_target_channel(user, ChannelId::new(0))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_rejected_setting_leaves_state_untouched() {
        let store = Arc::new(MemoryStore::new());
        let engine = ProgressionEngine::new(store.clone(), catalogue());
        let user = UserId::new(11);
        engine.set_season(user, 4).await.unwrap();
        let before = store.read(user).await.unwrap();

        assert!(engine.set_season(user, 123_456).await.is_err());
        assert_eq!(store.read(user).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_clear_target_channel_disables_uploads() {
        let user = UserId::new(12);
        let engine = ready_engine(Arc::new(MemoryStore::new()), user).await;

        let p = engine.clear_target_channel(user).await.unwrap();
        assert!(p.target_channel_id.is_none());
        assert_eq!(
            engine.handle_upload(user, "f".to_string()).await.unwrap_err(),
            AppError::NoTargetChannel
        );
    }

    #[tokio::test]
    async fn test_status_and_global_stats() {
        let store = Arc::new(MemoryStore::new());
        let alice = UserId::new(13);
        let bob = UserId::new(14);
        let engine = ready_engine(store.clone(), alice).await;
        engine
            .set_target_channel(bob, ChannelId::new(-100_14))
            .await
            .unwrap();
        engine
            .set_qualities(bob, labels(&["1080p"]))
            .await
            .unwrap();

        engine.handle_upload(alice, "a1".to_string()).await.unwrap();
        engine.handle_upload(bob, "b1".to_string()).await.unwrap();
        engine.handle_upload(bob, "b2".to_string()).await.unwrap();

        let status = engine.status(alice).await.unwrap();
        assert_eq!(status.quality_cursor, Some(1));
        assert_eq!(status.next_quality.as_deref(), Some("720p"));
        assert_eq!(status.uploads, UploadCounts { daily: 1, total: 1 });
        assert_eq!(status.backend, "memory");

        let stats = engine.global_stats().await.unwrap();
        assert_eq!(
            stats,
            GlobalStats {
                users: 2,
                daily_uploads: 3,
                total_uploads: 3,
            }
        );
    }
}

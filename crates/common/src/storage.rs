//! Flat-file state store.
//!
//! Layout under the base directory:
//!
//! - `users/<user_id>.json`: one whole [`UserProgression`] document per user,
//!   rewritten on every write
//! - `uploads/<user_id>.jsonl`: the user's upload history, one
//!   [`UploadRecord`] per line

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::id::UserId;
use crate::progression::{UploadCounts, UploadRecord, UserProgression, start_of_today};
use crate::store::StateStore;
use crate::{AppError, AppResult};

const USERS_DIR: &str = "users";
const UPLOADS_DIR: &str = "uploads";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// State store keeping one JSON document per user on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a file store rooted at `base_path`.
    ///
    /// Directories are created lazily on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Base directory of this store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn user_path(&self, user_id: UserId) -> PathBuf {
        self.base_path
            .join(USERS_DIR)
            .join(format!("{user_id}.json"))
    }

    fn history_path(&self, user_id: UserId) -> PathBuf {
        self.base_path
            .join(UPLOADS_DIR)
            .join(format!("{user_id}.jsonl"))
    }

    async fn ensure_dir(path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> AppResult<Option<UserProgression>> {
        match tokio::fs::read(self.user_path(user_id)).await {
            // Left behind by an interrupted first touch; never a complete document.
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!("Failed to read user file: {e}"))),
        }
    }

    /// Write `data` to a fresh sibling of `path` and sync it to disk.
    async fn write_temp(path: &Path, data: &[u8]) -> AppResult<PathBuf> {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        match written {
            Ok(()) => Ok(tmp),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(AppError::Storage(format!("Failed to write user file: {e}")))
            }
        }
    }

    /// Write the document next to its destination and rename it into place,
    /// so readers only ever see a complete file.
    async fn replace(&self, progression: &UserProgression) -> AppResult<()> {
        let path = self.user_path(progression.user_id);
        Self::ensure_dir(&path).await?;

        let data = serde_json::to_vec_pretty(progression)?;
        let tmp = Self::write_temp(&path, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Storage(format!("Failed to replace user file: {e}")));
        }

        Ok(())
    }

    /// Create the user file only if it does not exist yet.
    ///
    /// The complete document is linked into place, so the file never exists
    /// half-written. Returns `false` when the file already existed.
    async fn create(&self, progression: &UserProgression) -> AppResult<bool> {
        let path = self.user_path(progression.user_id);
        Self::ensure_dir(&path).await?;

        let data = serde_json::to_vec_pretty(progression)?;
        let tmp = Self::write_temp(&path, &data).await?;
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove temporary file");
        }

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(AppError::Storage(format!("Failed to create user file: {e}"))),
        }
    }

    async fn load_history(path: &Path) -> AppResult<Vec<UploadRecord>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Storage(format!("Failed to read history file: {e}")));
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }

    async fn list_dir(&self, dir: &str, extension: &str) -> AppResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(self.base_path.join(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Storage(format!("Failed to list {dir}: {e}"))),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list {dir}: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == extension) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn read(&self, user_id: UserId) -> AppResult<UserProgression> {
        if let Some(progression) = self.load(user_id).await? {
            return Ok(progression);
        }

        let default = UserProgression::new(user_id);
        if self.create(&default).await? {
            tracing::debug!(user_id = %user_id, "Created default progression file");
            return Ok(default);
        }

        // Lost the race against a concurrent first read.
        if let Some(progression) = self.load(user_id).await? {
            return Ok(progression);
        }

        tracing::warn!(user_id = %user_id, "Replacing empty progression file with defaults");
        self.replace(&default).await?;
        Ok(default)
    }

    async fn write(&self, progression: &UserProgression) -> AppResult<()> {
        self.replace(progression).await
    }

    async fn append_history(&self, record: &UploadRecord) -> AppResult<()> {
        let path = self.history_path(record.user_id);
        Self::ensure_dir(&path)
            .await
            .map_err(|e| AppError::History(e.to_string()))?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| AppError::History(format!("Failed to encode upload: {e}")))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::History(format!("Failed to open history file: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::History(format!("Failed to append upload: {e}")))?;
        file.flush()
            .await
            .map_err(|e| AppError::History(format!("Failed to append upload: {e}")))?;

        Ok(())
    }

    async fn count_users(&self) -> AppResult<u64> {
        Ok(self.list_dir(USERS_DIR, "json").await?.len() as u64)
    }

    async fn daily_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        let since = start_of_today();
        let history = Self::load_history(&self.history_path(user_id)).await?;
        Ok(history.iter().filter(|r| r.uploaded_at >= since).count() as u64)
    }

    async fn total_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        Ok(Self::load_history(&self.history_path(user_id)).await?.len() as u64)
    }

    async fn global_upload_counts(&self) -> AppResult<UploadCounts> {
        let since = start_of_today();
        let mut counts = UploadCounts::default();

        for path in self.list_dir(UPLOADS_DIR, "jsonl").await? {
            let history = Self::load_history(&path).await?;
            counts.total += history.len() as u64;
            counts.daily += history.iter().filter(|r| r.uploaded_at >= since).count() as u64;
        }

        Ok(counts)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ChannelId;
    use crate::progression::now;

    fn record(user: i64, episode: u32) -> UploadRecord {
        UploadRecord {
            user_id: UserId::new(user),
            season: 1,
            episode,
            total_episode: 12,
            quality: "720p".to_string(),
            file_ref: format!("file-{episode}"),
            rendered_caption: format!("S01E{episode:02}"),
            target_channel_id: ChannelId::new(-100_200),
            uploaded_at: now(),
        }
    }

    #[tokio::test]
    async fn test_read_unknown_user_returns_persisted_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let first = store.read(UserId::new(10)).await.unwrap();
        let second = store.read(UserId::new(10)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.season, 1);
        assert_eq!(first.episode, 1);
        assert!(dir.path().join("users/10.json").exists());
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let mut p = UserProgression::new(UserId::new(11));
        p.season = 2;
        p.episode = 7;
        p.total_episode = 24;
        p.video_count = 1;
        p.selected_qualities = vec!["480p".to_string(), "1080p".to_string()];
        p.caption_template = "S{season}E{episode}".to_string();
        p.target_channel_id = Some(ChannelId::new(-100_555));
        p.touch();

        store.write(&p).await.unwrap();
        assert_eq!(store.read(UserId::new(11)).await.unwrap(), p);

        // A fresh store over the same directory sees the same document.
        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.read(UserId::new(11)).await.unwrap(), p);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .write(&UserProgression::new(UserId::new(12)))
            .await
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("users"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["12.json"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_reads_agree() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for user in 0..50 {
            let mut reads = tokio::task::JoinSet::new();
            for _ in 0..8 {
                let store = store.clone();
                reads.spawn(async move { store.read(UserId::new(user)).await });
            }

            let mut seen = Vec::new();
            while let Some(joined) = reads.join_next().await {
                seen.push(joined.unwrap().unwrap());
            }
            assert!(seen.iter().all(|p| *p == seen[0]));
            assert_eq!(store.read(UserId::new(user)).await.unwrap(), seen[0]);
        }

        assert_eq!(store.count_users().await.unwrap(), 50);
        let leftovers = std::fs::read_dir(dir.path().join("users"))
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_empty_document_is_replaced_with_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("users")).unwrap();
        std::fs::write(dir.path().join("users/5.json"), b"").unwrap();

        let store = FileStore::new(dir.path());
        let first = store.read(UserId::new(5)).await.unwrap();
        assert_eq!(first.episode, 1);
        assert_eq!(store.read(UserId::new(5)).await.unwrap(), first);
        assert!(!std::fs::read(dir.path().join("users/5.json")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_document_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("users")).unwrap();
        std::fs::write(dir.path().join("users/13.json"), b"{not json").unwrap();

        let store = FileStore::new(dir.path());
        let err = store.read(UserId::new(13)).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[tokio::test]
    async fn test_history_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.read(UserId::new(1)).await.unwrap();
        store.read(UserId::new(2)).await.unwrap();
        store.append_history(&record(1, 1)).await.unwrap();
        store.append_history(&record(1, 2)).await.unwrap();
        store.append_history(&record(2, 1)).await.unwrap();

        assert_eq!(store.count_users().await.unwrap(), 2);
        assert_eq!(store.total_upload_count(UserId::new(1)).await.unwrap(), 2);
        assert_eq!(store.daily_upload_count(UserId::new(1)).await.unwrap(), 2);
        assert_eq!(store.total_upload_count(UserId::new(3)).await.unwrap(), 0);
        assert_eq!(
            store.global_upload_counts().await.unwrap(),
            UploadCounts { daily: 3, total: 3 }
        );
    }

    #[tokio::test]
    async fn test_empty_store_counts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("missing"));

        assert_eq!(store.count_users().await.unwrap(), 0);
        assert_eq!(
            store.global_upload_counts().await.unwrap(),
            UploadCounts::default()
        );
    }
}

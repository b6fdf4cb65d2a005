//! Relational state store backed by `PostgreSQL`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reelcap_common::{
    AppError, AppResult, ChannelId, StateStore, UploadCounts, UploadRecord, UserId,
    UserProgression, start_of_today,
};
use sea_orm::{DatabaseConnection, NotSet, Set};

use crate::entities::{upload_record, user_progression};
use crate::repositories::{UploadRecordRepository, UserProgressionRepository};

/// State store persisting progressions and history in relational tables.
#[derive(Clone)]
pub struct RelationalStore {
    progressions: UserProgressionRepository,
    uploads: UploadRecordRepository,
}

impl RelationalStore {
    /// Create a relational store over an open connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            progressions: UserProgressionRepository::new(Arc::clone(&db)),
            uploads: UploadRecordRepository::new(db),
        }
    }
}

fn to_column(value: u32, field: &str) -> AppResult<i32> {
    i32::try_from(value).map_err(|_| AppError::Database(format!("{field} out of range: {value}")))
}

fn from_column(value: i32, field: &str) -> AppResult<u32> {
    u32::try_from(value).map_err(|_| AppError::Database(format!("Invalid {field}: {value}")))
}

fn to_active_model(p: &UserProgression) -> AppResult<user_progression::ActiveModel> {
    Ok(user_progression::ActiveModel {
        user_id: Set(p.user_id.get()),
        season: Set(to_column(p.season, "season")?),
        episode: Set(to_column(p.episode, "episode")?),
        total_episode: Set(to_column(p.total_episode, "total_episode")?),
        video_count: Set(to_column(p.video_count, "video_count")?),
        selected_qualities: Set(serde_json::Value::from(p.selected_qualities.clone())),
        caption_template: Set(p.caption_template.clone()),
        target_channel_id: Set(p.target_channel_id.map(ChannelId::get)),
        created_at: Set(p.created_at.into()),
        updated_at: Set(p.updated_at.into()),
    })
}

fn from_model(model: user_progression::Model) -> AppResult<UserProgression> {
    let selected_qualities = serde_json::from_value(model.selected_qualities)
        .map_err(|e| AppError::Database(format!("Invalid selected_qualities: {e}")))?;

    Ok(UserProgression {
        user_id: UserId::new(model.user_id),
        season: from_column(model.season, "season")?,
        episode: from_column(model.episode, "episode")?,
        total_episode: from_column(model.total_episode, "total_episode")?,
        video_count: from_column(model.video_count, "video_count")?,
        selected_qualities,
        caption_template: model.caption_template,
        target_channel_id: model.target_channel_id.map(ChannelId::new),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn to_upload_model(r: &UploadRecord) -> AppResult<upload_record::ActiveModel> {
    Ok(upload_record::ActiveModel {
        id: NotSet,
        user_id: Set(r.user_id.get()),
        season: Set(to_column(r.season, "season")?),
        episode: Set(to_column(r.episode, "episode")?),
        total_episode: Set(to_column(r.total_episode, "total_episode")?),
        quality: Set(r.quality.clone()),
        file_ref: Set(r.file_ref.clone()),
        rendered_caption: Set(r.rendered_caption.clone()),
        target_channel_id: Set(r.target_channel_id.get()),
        uploaded_at: Set(r.uploaded_at.into()),
    })
}

#[async_trait]
impl StateStore for RelationalStore {
    async fn read(&self, user_id: UserId) -> AppResult<UserProgression> {
        if let Some(model) = self.progressions.find_by_user_id(user_id.get()).await? {
            return from_model(model);
        }

        let default = UserProgression::new(user_id);
        if self
            .progressions
            .insert_if_absent(to_active_model(&default)?)
            .await?
        {
            tracing::debug!(user_id = %user_id, "Created default progression row");
            return Ok(default);
        }

        // A concurrent first read inserted the row.
        let model = self
            .progressions
            .find_by_user_id(user_id.get())
            .await?
            .ok_or_else(|| AppError::Database(format!("Progression of {user_id} vanished")))?;
        from_model(model)
    }

    async fn write(&self, progression: &UserProgression) -> AppResult<()> {
        self.progressions
            .upsert(to_active_model(progression)?)
            .await
    }

    async fn append_history(&self, record: &UploadRecord) -> AppResult<()> {
        let model = to_upload_model(record).map_err(|e| AppError::History(e.to_string()))?;
        self.uploads.create(model).await.map_err(|e| match e {
            AppError::Unavailable(_) => e,
            other => AppError::History(other.to_string()),
        })
    }

    async fn count_users(&self) -> AppResult<u64> {
        self.progressions.count().await
    }

    async fn daily_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        self.uploads
            .count_by_user(user_id.get(), Some(start_of_today()))
            .await
    }

    async fn total_upload_count(&self, user_id: UserId) -> AppResult<u64> {
        self.uploads.count_by_user(user_id.get(), None).await
    }

    async fn global_upload_counts(&self) -> AppResult<UploadCounts> {
        Ok(UploadCounts {
            daily: self.uploads.count_all(Some(start_of_today())).await?,
            total: self.uploads.count_all(None).await?,
        })
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

//! Upload record repository.

use std::sync::Arc;

use crate::db_error;
use crate::entities::{UploadRecord, upload_record};
use chrono::{DateTime, Utc};
use reelcap_common::AppResult;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

/// Repository for the append-only upload history.
#[derive(Clone)]
pub struct UploadRecordRepository {
    db: Arc<DatabaseConnection>,
}

impl UploadRecordRepository {
    /// Create a new upload record repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append an upload.
    pub async fn create(&self, model: upload_record::ActiveModel) -> AppResult<()> {
        UploadRecord::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    /// Count uploads of a user, optionally only those at or after `since`.
    pub async fn count_by_user(
        &self,
        user_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let mut query = UploadRecord::find().filter(upload_record::Column::UserId.eq(user_id));
        if let Some(since) = since {
            query = query.filter(upload_record::Column::UploadedAt.gte(since));
        }

        query.count(self.db.as_ref()).await.map_err(db_error)
    }

    /// Count uploads of all users, optionally only those at or after `since`.
    pub async fn count_all(&self, since: Option<DateTime<Utc>>) -> AppResult<u64> {
        let mut query = UploadRecord::find();
        if let Some(since) = since {
            query = query.filter(upload_record::Column::UploadedAt.gte(since));
        }

        query.count(self.db.as_ref()).await.map_err(db_error)
    }
}

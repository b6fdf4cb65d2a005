//! User progression repository.

use std::sync::Arc;

use crate::db_error;
use crate::entities::{UserProgression, user_progression};
use reelcap_common::AppResult;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, TransactionTrait};

/// Columns overwritten when an existing progression is replaced.
const REPLACED_COLUMNS: [user_progression::Column; 8] = [
    user_progression::Column::Season,
    user_progression::Column::Episode,
    user_progression::Column::TotalEpisode,
    user_progression::Column::VideoCount,
    user_progression::Column::SelectedQualities,
    user_progression::Column::CaptionTemplate,
    user_progression::Column::TargetChannelId,
    user_progression::Column::UpdatedAt,
];

/// Repository for per-user progression rows.
#[derive(Clone)]
pub struct UserProgressionRepository {
    db: Arc<DatabaseConnection>,
}

impl UserProgressionRepository {
    /// Create a new user progression repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the progression of a user.
    pub async fn find_by_user_id(&self, user_id: i64) -> AppResult<Option<user_progression::Model>> {
        UserProgression::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Insert a row unless the user already has one.
    ///
    /// Returns `true` when the row was inserted.
    pub async fn insert_if_absent(&self, model: user_progression::ActiveModel) -> AppResult<bool> {
        let inserted = UserProgression::insert(model)
            .on_conflict(
                OnConflict::column(user_progression::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(db_error)?;

        Ok(inserted > 0)
    }

    /// Insert or replace a user's row inside a transaction.
    ///
    /// `created_at` of an existing row is preserved.
    pub async fn upsert(&self, model: user_progression::ActiveModel) -> AppResult<()> {
        let txn = self.db.begin().await.map_err(db_error)?;

        UserProgression::insert(model)
            .on_conflict(
                OnConflict::column(user_progression::Column::UserId)
                    .update_columns(REPLACED_COLUMNS)
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(db_error)?;

        txn.commit().await.map_err(db_error)
    }

    /// Count users with a progression row.
    pub async fn count(&self) -> AppResult<u64> {
        UserProgression::find()
            .count(self.db.as_ref())
            .await
            .map_err(db_error)
    }
}

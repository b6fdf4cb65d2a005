//! User progression entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Upload progression of one user.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_progression")]
pub struct Model {
    /// Chat platform user id.
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,

    pub season: i32,

    pub episode: i32,

    /// `0` when unset.
    #[sea_orm(default_value = 0)]
    pub total_episode: i32,

    /// Uploads applied toward the current episode.
    #[sea_orm(default_value = 0)]
    pub video_count: i32,

    /// Ordered quality labels.
    #[sea_orm(column_type = "JsonBinary")]
    pub selected_qualities: Json,

    #[sea_orm(column_type = "Text")]
    pub caption_template: String,

    #[sea_orm(nullable)]
    pub target_channel_id: Option<i64>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::upload_record::Entity")]
    UploadRecord,
}

impl Related<super::upload_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UploadRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Upload record entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A forwarded upload. Rows are only ever inserted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "upload_record")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(indexed)]
    pub user_id: i64,

    pub season: i32,

    pub episode: i32,

    pub total_episode: i32,

    pub quality: String,

    /// Opaque media handle from the transport.
    #[sea_orm(column_type = "Text")]
    pub file_ref: String,

    #[sea_orm(column_type = "Text")]
    pub rendered_caption: String,

    pub target_channel_id: i64,

    pub uploaded_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user_progression::Entity",
        from = "Column::UserId",
        to = "super::user_progression::Column::UserId"
    )]
    UserProgression,
}

impl Related<super::user_progression::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserProgression.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

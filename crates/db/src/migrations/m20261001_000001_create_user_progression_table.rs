//! Create user_progression table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserProgression::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserProgression::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserProgression::Season)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(UserProgression::Episode)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(UserProgression::TotalEpisode)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserProgression::VideoCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserProgression::SelectedQualities)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserProgression::CaptionTemplate)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserProgression::TargetChannelId).big_integer())
                    .col(
                        ColumnDef::new(UserProgression::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserProgression::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserProgression::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserProgression {
    Table,
    UserId,
    Season,
    Episode,
    TotalEpisode,
    VideoCount,
    SelectedQualities,
    CaptionTemplate,
    TargetChannelId,
    CreatedAt,
    UpdatedAt,
}

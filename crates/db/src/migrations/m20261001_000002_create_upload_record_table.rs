//! Create upload_record table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UploadRecord::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UploadRecord::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UploadRecord::UserId).big_integer().not_null())
                    .col(ColumnDef::new(UploadRecord::Season).integer().not_null())
                    .col(ColumnDef::new(UploadRecord::Episode).integer().not_null())
                    .col(
                        ColumnDef::new(UploadRecord::TotalEpisode)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UploadRecord::Quality)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(UploadRecord::FileRef).text().not_null())
                    .col(ColumnDef::new(UploadRecord::RenderedCaption).text().not_null())
                    .col(
                        ColumnDef::new(UploadRecord::TargetChannelId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UploadRecord::UploadedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // History is read per user and counted per day
        manager
            .create_index(
                Index::create()
                    .name("idx_upload_record_user_id_uploaded_at")
                    .table(UploadRecord::Table)
                    .col(UploadRecord::UserId)
                    .col(UploadRecord::UploadedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_upload_record_uploaded_at")
                    .table(UploadRecord::Table)
                    .col(UploadRecord::UploadedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UploadRecord::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UploadRecord {
    Table,
    Id,
    UserId,
    Season,
    Episode,
    TotalEpisode,
    Quality,
    FileRef,
    RenderedCaption,
    TargetChannelId,
    UploadedAt,
}

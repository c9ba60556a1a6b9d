//! Create app_notification table for in-app notification history.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AppNotification::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AppNotification::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AppNotification::UserId).string().not_null())
                    .col(
                        ColumnDef::new(AppNotification::NotificationType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AppNotification::Title).string().not_null())
                    .col(ColumnDef::new(AppNotification::Body).text().not_null())
                    .col(
                        ColumnDef::new(AppNotification::Metadata)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(AppNotification::ActionUrl).string().null())
                    .col(
                        ColumnDef::new(AppNotification::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AppNotification::IsClicked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(AppNotification::ReadAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(AppNotification::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Index on user_id for history listing
        manager
            .create_index(
                Index::create()
                    .name("idx_app_notification_user_id")
                    .table(AppNotification::Table)
                    .col(AppNotification::UserId)
                    .to_owned(),
            )
            .await?;

        // Index on created_at for retention purges
        manager
            .create_index(
                Index::create()
                    .name("idx_app_notification_created_at")
                    .table(AppNotification::Table)
                    .col(AppNotification::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AppNotification::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum AppNotification {
    Table,
    Id,
    UserId,
    NotificationType,
    Title,
    Body,
    Metadata,
    ActionUrl,
    IsRead,
    IsClicked,
    ReadAt,
    CreatedAt,
}

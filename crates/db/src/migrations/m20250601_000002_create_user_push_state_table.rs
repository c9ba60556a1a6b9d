//! Create user_push_state table for denormalized per-user push fields.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserPushState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserPushState::UserId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserPushState::NotificationsEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(UserPushState::LastToken).text().null())
                    .col(
                        ColumnDef::new(UserPushState::LastTokenUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserPushState::DeviceType)
                            .string_len(16)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserPushState::IsPwa)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserPushState::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserPushState::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum UserPushState {
    Table,
    UserId,
    NotificationsEnabled,
    LastToken,
    LastTokenUpdatedAt,
    DeviceType,
    IsPwa,
    UpdatedAt,
}

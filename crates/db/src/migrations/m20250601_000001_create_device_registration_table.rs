//! Create device_registration table for push device tokens.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeviceRegistration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceRegistration::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceRegistration::Token).text().not_null())
                    .col(
                        ColumnDef::new(DeviceRegistration::DeviceType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::DeviceName)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::UserAgent)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::IsPwa)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceRegistration::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Index on user_id for listing a user's devices
        manager
            .create_index(
                Index::create()
                    .name("idx_device_registration_user_id")
                    .table(DeviceRegistration::Table)
                    .col(DeviceRegistration::UserId)
                    .to_owned(),
            )
            .await?;

        // Unique index on token: a token maps to at most one registration
        manager
            .create_index(
                Index::create()
                    .name("idx_device_registration_token")
                    .table(DeviceRegistration::Table)
                    .col(DeviceRegistration::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index on is_active for resolving live endpoints
        manager
            .create_index(
                Index::create()
                    .name("idx_device_registration_active")
                    .table(DeviceRegistration::Table)
                    .col(DeviceRegistration::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeviceRegistration::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum DeviceRegistration {
    Table,
    Id,
    UserId,
    Token,
    DeviceType,
    DeviceName,
    UserAgent,
    IsPwa,
    IsActive,
    LastUsedAt,
    CreatedAt,
    UpdatedAt,
}

//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250601_000001_create_device_registration_table;
mod m20250601_000002_create_user_push_state_table;
mod m20250601_000003_create_notification_preferences_table;
mod m20250601_000004_create_app_notification_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_device_registration_table::Migration),
            Box::new(m20250601_000002_create_user_push_state_table::Migration),
            Box::new(m20250601_000003_create_notification_preferences_table::Migration),
            Box::new(m20250601_000004_create_app_notification_table::Migration),
        ]
    }
}

//! Database migrations for the automations service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_090000_create_channels;
mod m2026_01_05_090100_create_channel_routing_ids;
mod m2026_01_05_090200_create_automations;
mod m2026_01_05_090300_create_inbound_events;
mod m2026_01_05_090400_create_interaction_reports;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_090000_create_channels::Migration),
            Box::new(m2026_01_05_090100_create_channel_routing_ids::Migration),
            Box::new(m2026_01_05_090200_create_automations::Migration),
            Box::new(m2026_01_05_090300_create_inbound_events::Migration),
            Box::new(m2026_01_05_090400_create_interaction_reports::Migration),
        ]
    }
}

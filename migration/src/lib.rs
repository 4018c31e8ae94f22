pub use sea_orm_migration::prelude::*;

mod m20250101_000001_initial_schema;
mod m20250108_000001_add_visit_reschedule;
mod m20250115_000001_add_message_threads;
mod m20250120_000001_add_property_images;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_initial_schema::Migration),
            Box::new(m20250108_000001_add_visit_reschedule::Migration),
            Box::new(m20250115_000001_add_message_threads::Migration),
            Box::new(m20250120_000001_add_property_images::Migration),
        ]
    }
}

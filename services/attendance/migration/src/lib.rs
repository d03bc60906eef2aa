pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_qr_sessions;
mod m20260301_000002_create_qr_scans;
mod m20260301_000003_create_attendance_records;
mod m20260301_000004_create_outbox_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_qr_sessions::Migration),
            Box::new(m20260301_000002_create_qr_scans::Migration),
            Box::new(m20260301_000003_create_attendance_records::Migration),
            Box::new(m20260301_000004_create_outbox_events::Migration),
        ]
    }
}

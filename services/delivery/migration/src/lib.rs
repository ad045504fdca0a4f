pub use sea_orm_migration::prelude::*;

mod m20260901_000001_create_idempotency_records;
mod m20260901_000002_create_webhook_subscriptions;
mod m20260901_000003_create_webhook_calls;
mod m20260901_000004_create_jobs;
mod m20260901_000005_create_job_schedules;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260901_000001_create_idempotency_records::Migration),
            Box::new(m20260901_000002_create_webhook_subscriptions::Migration),
            Box::new(m20260901_000003_create_webhook_calls::Migration),
            Box::new(m20260901_000004_create_jobs::Migration),
            Box::new(m20260901_000005_create_job_schedules::Migration),
        ]
    }
}

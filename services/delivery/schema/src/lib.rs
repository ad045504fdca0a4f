//! sea-orm entities for the delivery service.

pub mod idempotency_records;
pub mod job_schedules;
pub mod jobs;
pub mod webhook_calls;
pub mod webhook_subscriptions;

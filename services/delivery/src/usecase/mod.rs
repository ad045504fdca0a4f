pub mod backoff;
pub mod email;
pub mod idempotency;
pub mod inbound;
pub mod jobs;
pub mod lock;
pub mod rate_limit;
pub mod retention;
pub mod webhook_call;
pub mod webhook_delivery;
pub mod webhook_emit;
pub mod webhook_recovery;
pub mod webhook_subscription;

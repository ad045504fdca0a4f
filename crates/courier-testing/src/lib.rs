//! Test utilities for Courier services.
//!
//! Provides `MockTeam` gateway headers and `MockWebhookReceiver`, a real HTTP
//! endpoint that records webhook deliveries. Import from tests only.

pub mod receiver;
pub mod team;

pub use receiver::{MockWebhookReceiver, ReceivedRequest};
pub use team::MockTeam;

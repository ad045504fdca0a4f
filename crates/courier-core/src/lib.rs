//! Cross-cutting plumbing shared by Courier services: tracing setup, HTTP
//! middleware, health probes, error bodies and gateway identity extraction.

pub mod error;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod serde;
pub mod tracing;

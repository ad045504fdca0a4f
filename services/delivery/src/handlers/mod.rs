pub mod emails;
pub mod health;
pub mod inbound;
pub mod webhook_calls;
pub mod webhooks;

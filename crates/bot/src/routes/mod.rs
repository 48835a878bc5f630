//! HTTP route handlers.

pub mod health;
pub mod metrics;
pub mod outbox;
pub mod updates;

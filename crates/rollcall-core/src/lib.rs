//! Shared HTTP plumbing for Rollcall services.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;

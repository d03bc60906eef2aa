//! Auth context shared across Rollcall services.
//!
//! Credentials are verified upstream by the gateway; services only read the identity
//! it forwards.

pub mod identity;

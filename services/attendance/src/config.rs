use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::domain::types::{DEFAULT_EXPIRY_MINUTES, MAX_EXPIRY_MINUTES};

/// Upper bound for `SESSION_RETENTION_DAYS`.
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Attendance service configuration loaded from environment variables.
#[derive(Debug)]
pub struct AttendanceConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Subjects service gRPC URL (e.g. "http://academics:50051"). Env var: `SUBJECTS_GRPC_URL`.
    pub subjects_grpc_url: String,
    /// TCP port to listen on (default 3114). Env var: `ATTENDANCE_PORT`.
    pub attendance_port: u16,
    /// Session lifetime when the issuer gives none. Env var: `DEFAULT_EXPIRY_MINUTES`.
    pub default_expiry_minutes: i64,
    /// Seconds between expiry sweeps. Env var: `SWEEP_INTERVAL_SECS`.
    pub sweep_interval_secs: u64,
    /// Days an expired session is kept before purging. Env var: `SESSION_RETENTION_DAYS`.
    pub session_retention_days: i64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_in<T>(key: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + PartialOrd + Display + Copy,
{
    within(key, env_or(key, default), default, range)
}

fn within<T>(key: &str, value: T, default: T, range: RangeInclusive<T>) -> T
where
    T: PartialOrd + Display + Copy,
{
    if range.contains(&value) {
        value
    } else {
        tracing::warn!(
            key,
            %value,
            %default,
            "config value out of range, using default"
        );
        default
    }
}

impl AttendanceConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            subjects_grpc_url: std::env::var("SUBJECTS_GRPC_URL").expect("SUBJECTS_GRPC_URL"),
            attendance_port: env_or("ATTENDANCE_PORT", 3114),
            default_expiry_minutes: env_in(
                "DEFAULT_EXPIRY_MINUTES",
                DEFAULT_EXPIRY_MINUTES,
                1..=MAX_EXPIRY_MINUTES,
            ),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 300),
            session_retention_days: env_in("SESSION_RETENTION_DAYS", 30, 1..=MAX_RETENTION_DAYS),
        }
    }
}

#![allow(async_fn_in_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use rollcall_domain::pagination::{PageRequest, Sort};

use crate::domain::types::{
    AttendanceRecord, OutboxEvent, QrSession, ScanEntry, ScanRejection, Subject,
};
use crate::error::AttendanceServiceError;

/// Source of "now". Every time-dependent decision reads through this port.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Port for reading subjects and their enrollment from the academics service.
pub trait SubjectPort: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>, AttendanceServiceError>;
}

/// Result of the conditional scan append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanWrite {
    /// Scan stored; counters after the write.
    Accepted { scan_count: u32, active: bool },
    /// Write-time predicate failed; nothing was changed.
    Rejected(ScanRejection),
}

/// Repository for QR sessions and their scans.
pub trait QrSessionRepository: Send + Sync {
    /// Insert a new session. Returns `false` without writing if its code or token is
    /// already taken.
    async fn try_create(&self, session: &QrSession) -> Result<bool, AttendanceServiceError>;

    /// Find the session matching both `code` and `token`.
    async fn find_by_credentials(
        &self,
        code: &str,
        token: &str,
    ) -> Result<Option<QrSession>, AttendanceServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QrSession>, AttendanceServiceError>;

    /// Atomically append `entry` iff, at write time, the session is active, not past
    /// `expires_at` relative to `entry.scanned_at`, below its cap, and has no scan from
    /// the same student. Increments `scan_count` and deactivates the session when the
    /// cap is reached.
    async fn append_scan(
        &self,
        session_id: Uuid,
        entry: &ScanEntry,
    ) -> Result<ScanWrite, AttendanceServiceError>;

    /// Set `active = false`. Returns `true` if the session was active.
    async fn deactivate(&self, id: Uuid) -> Result<bool, AttendanceServiceError>;

    /// Deactivate every active session whose `expires_at <= now`.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AttendanceServiceError>;

    /// Delete sessions (and their scans) that expired before `cutoff`.
    async fn purge_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AttendanceServiceError>;
}

/// Repository for day-level attendance records.
pub trait AttendanceRecordRepository: Send + Sync {
    /// Create or overwrite the record for `(student_id, subject_id, day)` and enqueue
    /// `event` in the same transaction. An existing record keeps its id and
    /// `created_at`. Contention surfaces as `PersistenceConflict`.
    async fn upsert_with_outbox(
        &self,
        record: &AttendanceRecord,
        event: &OutboxEvent,
    ) -> Result<AttendanceRecord, AttendanceServiceError>;

    async fn find_by_key(
        &self,
        student_id: Uuid,
        subject_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceServiceError>;

    async fn list_by_student(
        &self,
        student_id: Uuid,
        subject_id: Option<Uuid>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError>;

    async fn list_by_subject(
        &self,
        subject_id: Uuid,
        day: Option<NaiveDate>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError>;
}

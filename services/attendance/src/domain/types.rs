use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rollcall_domain::attendance::AttendanceStatus;
use rollcall_domain::geo::{Coordinates, Geofence};

/// Subject as seen through the enrollment collaborator (read-only).
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub teacher_id: Uuid,
    pub enrolled_students: Vec<Uuid>,
}

impl Subject {
    pub fn is_enrolled(&self, student_id: Uuid) -> bool {
        self.enrolled_students.contains(&student_id)
    }
}

/// Official start and end of the class period a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Device position reported with a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported GPS accuracy in meters; stored, not used for the radius check.
    pub accuracy: Option<f64>,
}

impl ScanLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
}

/// One accepted scan inside a session. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub student_id: Uuid,
    pub scanned_at: DateTime<Utc>,
    pub location: Option<ScanLocation>,
    pub device_info: Option<DeviceInfo>,
}

/// Reason a scan was not accepted. These are expected outcomes, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanRejection {
    SessionNotFound,
    SessionExpired,
    NotEnrolled,
    OutOfRange,
    AlreadyScanned,
    LimitReached,
}

/// Short-lived, location-bound QR credential for one class period.
///
/// Invariants: `scan_count == scans.len()`, no two scans share a student,
/// `scan_count <= max_scans` when capped, and `active` only ever goes true→false.
#[derive(Debug, Clone)]
pub struct QrSession {
    pub id: Uuid,
    pub code: String,
    pub token: String,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub class_window: ClassWindow,
    pub geofence: Option<Geofence>,
    pub expires_at: DateTime<Utc>,
    pub max_scans: Option<u32>,
    pub scan_count: u32,
    pub scans: Vec<ScanEntry>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl QrSession {
    /// Accepting scans at `now`: active and not yet past `expires_at`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }

    pub fn is_full(&self) -> bool {
        matches!(self.max_scans, Some(max) if self.scan_count >= max)
    }

    pub fn scan_of(&self, student_id: Uuid) -> Option<&ScanEntry> {
        self.scans.iter().find(|s| s.student_id == student_id)
    }

    pub fn has_scanned(&self, student_id: Uuid) -> bool {
        self.scan_of(student_id).is_some()
    }

    /// `true` if the scan location satisfies the geofence. Scans without a location
    /// and sessions without an enforced fence always pass.
    pub fn admits_location(&self, location: Option<&ScanLocation>) -> bool {
        match (&self.geofence, location) {
            (Some(fence), Some(loc)) => fence.contains(loc.coordinates()),
            _ => true,
        }
    }

    /// Conditional append: re-checks the write-time predicates against this state and
    /// either applies the scan or reports why it cannot.
    ///
    /// The store must run this as one atomic step per session.
    pub fn accept(&mut self, entry: ScanEntry) -> Result<(), ScanRejection> {
        if self.has_scanned(entry.student_id) {
            return Err(ScanRejection::AlreadyScanned);
        }
        if self.is_full() {
            return Err(ScanRejection::LimitReached);
        }
        if !self.is_open(entry.scanned_at) {
            return Err(ScanRejection::SessionExpired);
        }
        self.scans.push(entry);
        self.scan_count += 1;
        if self.is_full() {
            self.active = false;
        }
        Ok(())
    }

    /// Flip to inactive. Returns `false` if it already was.
    pub fn deactivate(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }
}

/// Accepted scan decision handed from scan validation to attendance recording.
#[derive(Debug, Clone)]
pub struct AcceptedScan {
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub accepted_at: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
    pub source_session_id: Uuid,
    pub location: Option<ScanLocation>,
    pub device_info: Option<DeviceInfo>,
}

impl AcceptedScan {
    pub fn new(session: &QrSession, entry: &ScanEntry) -> Self {
        Self {
            student_id: entry.student_id,
            subject_id: session.subject_id,
            teacher_id: session.teacher_id,
            accepted_at: entry.scanned_at,
            session_start: session.class_window.start,
            source_session_id: session.id,
            location: entry.location,
            device_info: entry.device_info.clone(),
        }
    }

    pub fn status(&self) -> AttendanceStatus {
        AttendanceStatus::derive(self.accepted_at, self.session_start)
    }
}

/// Day-level attendance, keyed by `(student_id, subject_id, day)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
    /// `None` for manual marks.
    pub source_session_id: Option<Uuid>,
    pub location: Option<ScanLocation>,
    pub device_info: Option<DeviceInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn same_key(&self, other: &AttendanceRecord) -> bool {
        self.student_id == other.student_id
            && self.subject_id == other.subject_id
            && self.day == other.day
    }
}

/// Calendar bucket of an instant. Days are UTC dates.
pub fn calendar_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// Outbox event for async delivery (attendance notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
}

pub const ATTENDANCE_MARKED_EVENT: &str = "attendance_marked";

/// Session code length in characters (uppercase alphanumeric, ~82 bits).
pub const SESSION_CODE_LEN: usize = 16;

/// Random bytes behind a session token (256 bits).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Attempts at drawing an unused code/token pair before giving up.
pub const MAX_ISSUE_ATTEMPTS: u32 = 5;

pub const DEFAULT_EXPIRY_MINUTES: i64 = 10;

pub const MAX_EXPIRY_MINUTES: i64 = 24 * 60;

/// Largest per-session scan cap; the column is a Postgres `integer`.
pub const MAX_SCAN_CAP: u32 = i32::MAX as u32;

/// Attempts at the attendance upsert before reporting a persistence conflict.
pub const MAX_RECORD_ATTEMPTS: u32 = 3;

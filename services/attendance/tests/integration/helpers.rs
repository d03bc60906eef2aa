use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use rollcall_attendance::domain::repository::{
    AttendanceRecordRepository, Clock, QrSessionRepository, ScanWrite, SubjectPort,
};
use rollcall_attendance::domain::types::{
    AttendanceRecord, ClassWindow, OutboxEvent, QrSession, ScanEntry, ScanLocation,
    ScanRejection, Subject,
};
use rollcall_attendance::error::AttendanceServiceError;
use rollcall_attendance::usecase::record::RecordAttendanceUseCase;
use rollcall_attendance::usecase::scan::{
    CheckScanUseCase, RetryRecordingUseCase, ScanInput, SubmitScanUseCase,
};
use rollcall_domain::geo::{Coordinates, EARTH_RADIUS_METERS, Geofence};
use rollcall_domain::pagination::{PageRequest, Sort};

// ── Time ─────────────────────────────────────────────────────────────────────

/// 2025-03-10 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    at_s(h, m, 0)
}

pub fn at_s(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, h, m, s).unwrap()
}

pub fn class_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

/// Clock that replays queued instants, then keeps returning the last one.
#[derive(Clone)]
pub struct TestClock {
    instants: Arc<Mutex<VecDeque<DateTime<Utc>>>>,
}

impl TestClock {
    pub fn fixed(now: DateTime<Utc>) -> Self {
        Self::sequence([now])
    }

    pub fn sequence(instants: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            instants: Arc::new(Mutex::new(instants.into_iter().collect())),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut instants = self.instants.lock().unwrap();
        instants.clear();
        instants.push_back(now);
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let mut instants = self.instants.lock().unwrap();
        if instants.len() > 1 {
            instants.pop_front().unwrap()
        } else {
            *instants.front().expect("clock has no instant")
        }
    }
}

// ── Location ─────────────────────────────────────────────────────────────────

pub const CAMPUS: Coordinates = Coordinates {
    latitude: 37.5665,
    longitude: 126.9780,
};

/// A point `meters` due north of the campus center.
pub fn north_of_campus(meters: f64) -> ScanLocation {
    ScanLocation {
        latitude: CAMPUS.latitude + (meters / EARTH_RADIUS_METERS).to_degrees(),
        longitude: CAMPUS.longitude,
        accuracy: Some(8.0),
    }
}

pub fn campus_fence(radius_meters: f64) -> Geofence {
    Geofence {
        center: CAMPUS,
        radius_meters: Some(radius_meters),
        address: Some("Engineering Hall 301".to_owned()),
    }
}

// ── MockSubjectPort ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MockSubjectPort {
    pub subjects: Vec<Subject>,
}

impl SubjectPort for MockSubjectPort {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subject>, AttendanceServiceError> {
        Ok(self.subjects.iter().find(|s| s.id == id).cloned())
    }
}

// ── MockSessionRepo ──────────────────────────────────────────────────────────

/// In-memory session store. Reads yield once so concurrent callers interleave
/// between their read and their write.
#[derive(Clone, Default)]
pub struct MockSessionRepo {
    pub sessions: Arc<Mutex<Vec<QrSession>>>,
    /// Number of upcoming `try_create` calls to report as code collisions.
    pub collisions: Arc<AtomicU32>,
    pub create_attempts: Arc<AtomicU32>,
}

impl MockSessionRepo {
    pub fn with_collisions(n: u32) -> Self {
        let repo = Self::default();
        repo.collisions.store(n, Ordering::SeqCst);
        repo
    }

    pub fn insert(&self, session: QrSession) {
        self.sessions.lock().unwrap().push(session);
    }

    pub fn get(&self, id: Uuid) -> QrSession {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("session not in mock store")
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl QrSessionRepository for MockSessionRepo {
    async fn try_create(&self, session: &QrSession) -> Result<bool, AttendanceServiceError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }
        let mut sessions = self.sessions.lock().unwrap();
        if sessions
            .iter()
            .any(|s| s.code == session.code || s.token == session.token)
        {
            return Ok(false);
        }
        sessions.push(session.clone());
        Ok(true)
    }

    async fn find_by_credentials(
        &self,
        code: &str,
        token: &str,
    ) -> Result<Option<QrSession>, AttendanceServiceError> {
        let found = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.code == code && s.token == token)
            .cloned();
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QrSession>, AttendanceServiceError> {
        let found = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned();
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn append_scan(
        &self,
        session_id: Uuid,
        entry: &ScanEntry,
    ) -> Result<ScanWrite, AttendanceServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
            return Ok(ScanWrite::Rejected(ScanRejection::SessionNotFound));
        };
        Ok(match session.accept(entry.clone()) {
            Ok(()) => ScanWrite::Accepted {
                scan_count: session.scan_count,
                active: session.active,
            },
            Err(rejection) => ScanWrite::Rejected(rejection),
        })
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, AttendanceServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter_mut()
            .find(|s| s.id == id)
            .is_some_and(|s| s.deactivate()))
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AttendanceServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut count = 0;
        for session in sessions.iter_mut().filter(|s| s.expires_at <= now) {
            if session.deactivate() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AttendanceServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.expires_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }
}

// ── MockRecordRepo ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockRecordRepo {
    pub records: Arc<Mutex<Vec<AttendanceRecord>>>,
    pub events: Arc<Mutex<Vec<OutboxEvent>>>,
    /// Number of upcoming upserts to fail with `PersistenceConflict`.
    pub conflicts: Arc<AtomicU32>,
    /// When set, every upsert fails with an internal error.
    pub broken: Arc<AtomicBool>,
    pub upsert_attempts: Arc<AtomicU32>,
}

impl MockRecordRepo {
    pub fn with_conflicts(n: u32) -> Self {
        let repo = Self::default();
        repo.conflicts.store(n, Ordering::SeqCst);
        repo
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<AttendanceRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn all_events(&self) -> Vec<OutboxEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.upsert_attempts.load(Ordering::SeqCst)
    }
}

fn page_of(mut records: Vec<AttendanceRecord>, sort: Sort, page: PageRequest) -> Vec<AttendanceRecord> {
    records.sort_by_key(|r| (r.day, r.marked_at));
    if sort == Sort::Desc {
        records.reverse();
    }
    records
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

impl AttendanceRecordRepository for MockRecordRepo {
    async fn upsert_with_outbox(
        &self,
        record: &AttendanceRecord,
        event: &OutboxEvent,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        self.upsert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("database unavailable").into());
        }
        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AttendanceServiceError::PersistenceConflict);
        }

        let mut records = self.records.lock().unwrap();
        let stored = match records.iter_mut().find(|r| r.same_key(record)) {
            Some(existing) => {
                *existing = AttendanceRecord {
                    id: existing.id,
                    created_at: existing.created_at,
                    ..record.clone()
                };
                existing.clone()
            }
            None => {
                records.push(record.clone());
                record.clone()
            }
        };

        let mut events = self.events.lock().unwrap();
        if !events
            .iter()
            .any(|e| e.idempotency_key == event.idempotency_key)
        {
            events.push(event.clone());
        }
        Ok(stored)
    }

    async fn find_by_key(
        &self,
        student_id: Uuid,
        subject_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceServiceError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.student_id == student_id && r.subject_id == subject_id && r.day == day)
            .cloned())
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        subject_id: Option<Uuid>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError> {
        let matching = self
            .all()
            .into_iter()
            .filter(|r| r.student_id == student_id)
            .filter(|r| subject_id.is_none_or(|id| r.subject_id == id))
            .collect();
        Ok(page_of(matching, sort, page))
    }

    async fn list_by_subject(
        &self,
        subject_id: Uuid,
        day: Option<NaiveDate>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError> {
        let matching = self
            .all()
            .into_iter()
            .filter(|r| r.subject_id == subject_id)
            .filter(|r| day.is_none_or(|d| r.day == d))
            .collect();
        Ok(page_of(matching, sort, page))
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────────

/// One subject with a teacher and three enrolled students, plus empty stores.
pub struct Fixture {
    pub teacher_id: Uuid,
    pub students: Vec<Uuid>,
    pub subject: Subject,
    pub subjects: MockSubjectPort,
    pub sessions: MockSessionRepo,
    pub records: MockRecordRepo,
    pub clock: TestClock,
}

impl Fixture {
    pub fn new() -> Self {
        let teacher_id = Uuid::new_v4();
        let students: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let subject = Subject {
            id: Uuid::new_v4(),
            name: "Operating Systems".to_owned(),
            teacher_id,
            enrolled_students: students.clone(),
        };
        Self {
            teacher_id,
            students,
            subjects: MockSubjectPort {
                subjects: vec![subject.clone()],
            },
            subject,
            sessions: MockSessionRepo::default(),
            records: MockRecordRepo::default(),
            clock: TestClock::fixed(at(8, 55)),
        }
    }

    /// Class 09:00 to 10:00, issued 08:55 with a 10 minute expiry (09:05), fenced at 50 m.
    pub fn seed_session(&self, max_scans: Option<u32>) -> QrSession {
        self.seed_session_until(max_scans, at(8, 55) + Duration::minutes(10))
    }

    pub fn seed_session_until(
        &self,
        max_scans: Option<u32>,
        expires_at: DateTime<Utc>,
    ) -> QrSession {
        let session = QrSession {
            id: Uuid::new_v4(),
            code: format!("CODE{}", self.sessions.len()),
            token: format!("token-{}", Uuid::new_v4()),
            subject_id: self.subject.id,
            teacher_id: self.teacher_id,
            class_window: ClassWindow {
                start: at(9, 0),
                end: at(10, 0),
            },
            geofence: Some(campus_fence(50.0)),
            expires_at,
            max_scans,
            scan_count: 0,
            scans: vec![],
            active: true,
            created_at: at(8, 55),
        };
        self.sessions.insert(session.clone());
        session
    }

    pub fn recorder(&self) -> RecordAttendanceUseCase<MockRecordRepo, TestClock> {
        RecordAttendanceUseCase {
            records: self.records.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn submit(
        &self,
    ) -> SubmitScanUseCase<MockSessionRepo, MockSubjectPort, MockRecordRepo, TestClock> {
        SubmitScanUseCase {
            sessions: self.sessions.clone(),
            subjects: self.subjects.clone(),
            recorder: self.recorder(),
        }
    }

    pub fn check(&self) -> CheckScanUseCase<MockSessionRepo, MockSubjectPort, TestClock> {
        CheckScanUseCase {
            sessions: self.sessions.clone(),
            subjects: self.subjects.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn retry(
        &self,
    ) -> RetryRecordingUseCase<MockSessionRepo, MockSubjectPort, MockRecordRepo, TestClock> {
        RetryRecordingUseCase {
            sessions: self.sessions.clone(),
            subjects: self.subjects.clone(),
            recorder: self.recorder(),
        }
    }
}

pub fn scan_input(session: &QrSession, student_id: Uuid, location: Option<ScanLocation>) -> ScanInput {
    ScanInput {
        code: session.code.clone(),
        token: session.token.clone(),
        student_id,
        location,
        device_info: None,
    }
}

use chrono::{NaiveDate, SecondsFormat};
use serde_json::json;
use uuid::Uuid;

use rollcall_domain::attendance::AttendanceStatus;
use rollcall_domain::pagination::{PageRequest, Sort};

use crate::domain::repository::{AttendanceRecordRepository, Clock, SubjectPort};
use crate::domain::types::{
    ATTENDANCE_MARKED_EVENT, AcceptedScan, AttendanceRecord, MAX_RECORD_ATTEMPTS, OutboxEvent,
    calendar_day,
};
use crate::error::AttendanceServiceError;
use crate::usecase::session::SessionViewer;

fn attendance_marked_event(record: &AttendanceRecord, subject_name: &str) -> OutboxEvent {
    let timestamp = record.marked_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    OutboxEvent {
        id: Uuid::now_v7(),
        kind: ATTENDANCE_MARKED_EVENT.to_owned(),
        payload: json!({
            "student_id": record.student_id,
            "subject_name": subject_name,
            "status": record.status,
            "timestamp": timestamp,
        }),
        idempotency_key: format!(
            "{ATTENDANCE_MARKED_EVENT}:{}:{}:{}:{}",
            record.student_id,
            record.subject_id,
            record.day,
            record.marked_at.timestamp_millis()
        ),
    }
}

// ── RecordAttendance ─────────────────────────────────────────────────────────

/// Writes day-level records. Shared by the scan pipeline and manual marking.
pub struct RecordAttendanceUseCase<R, C>
where
    R: AttendanceRecordRepository,
    C: Clock,
{
    pub records: R,
    pub clock: C,
}

impl<R, C> RecordAttendanceUseCase<R, C>
where
    R: AttendanceRecordRepository,
    C: Clock,
{
    /// Turn an accepted scan into the record for its day.
    pub async fn record_scan(
        &self,
        scan: AcceptedScan,
        subject_name: &str,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        let now = self.clock.now();
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: scan.student_id,
            subject_id: scan.subject_id,
            teacher_id: scan.teacher_id,
            day: calendar_day(scan.accepted_at),
            status: scan.status(),
            marked_at: scan.accepted_at,
            source_session_id: Some(scan.source_session_id),
            location: scan.location,
            device_info: scan.device_info,
            created_at: now,
            updated_at: now,
        };
        self.write(record, subject_name).await
    }

    /// Upsert `record` together with its notification, retrying on contention.
    pub async fn write(
        &self,
        record: AttendanceRecord,
        subject_name: &str,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        let event = attendance_marked_event(&record, subject_name);

        for attempt in 1..=MAX_RECORD_ATTEMPTS {
            match self.records.upsert_with_outbox(&record, &event).await {
                Ok(stored) => {
                    tracing::info!(
                        record_id = %stored.id,
                        student_id = %stored.student_id,
                        subject_id = %stored.subject_id,
                        day = %stored.day,
                        status = %stored.status,
                        "attendance recorded"
                    );
                    return Ok(stored);
                }
                Err(AttendanceServiceError::PersistenceConflict) => {
                    tracing::warn!(
                        attempt,
                        student_id = %record.student_id,
                        day = %record.day,
                        "attendance upsert conflicted"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(AttendanceServiceError::PersistenceConflict)
    }
}

// ── ManualMark ───────────────────────────────────────────────────────────────

pub struct ManualMarkInput {
    pub subject_id: Uuid,
    pub student_id: Uuid,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
    pub actor: SessionViewer,
}

pub struct ManualMarkUseCase<S, R, C>
where
    S: SubjectPort,
    R: AttendanceRecordRepository,
    C: Clock,
{
    pub subjects: S,
    pub recorder: RecordAttendanceUseCase<R, C>,
}

impl<S, R, C> ManualMarkUseCase<S, R, C>
where
    S: SubjectPort,
    R: AttendanceRecordRepository,
    C: Clock,
{
    /// Staff override of a day's status, e.g. excusing an absence. Overwrites any
    /// scan-derived record for the same day.
    pub async fn execute(
        &self,
        input: ManualMarkInput,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        let subject = self
            .subjects
            .find_by_id(input.subject_id)
            .await?
            .ok_or(AttendanceServiceError::SubjectNotFound)?;
        input.actor.authorize_owner(subject.teacher_id)?;
        if !subject.is_enrolled(input.student_id) {
            return Err(AttendanceServiceError::NotEnrolled);
        }

        let now = self.recorder.clock.now();
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: input.student_id,
            subject_id: subject.id,
            teacher_id: subject.teacher_id,
            day: input.day,
            status: input.status,
            marked_at: now,
            source_session_id: None,
            location: None,
            device_info: None,
            created_at: now,
            updated_at: now,
        };
        self.recorder.write(record, &subject.name).await
    }
}

// ── Listing ──────────────────────────────────────────────────────────────────

pub struct ListStudentRecordsUseCase<R: AttendanceRecordRepository> {
    pub records: R,
}

impl<R: AttendanceRecordRepository> ListStudentRecordsUseCase<R> {
    pub async fn execute(
        &self,
        student_id: Uuid,
        subject_id: Option<Uuid>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError> {
        self.records
            .list_by_student(student_id, subject_id, sort, page)
            .await
    }
}

pub struct ListSubjectRecordsUseCase<S, R>
where
    S: SubjectPort,
    R: AttendanceRecordRepository,
{
    pub subjects: S,
    pub records: R,
}

impl<S, R> ListSubjectRecordsUseCase<S, R>
where
    S: SubjectPort,
    R: AttendanceRecordRepository,
{
    pub async fn execute(
        &self,
        subject_id: Uuid,
        viewer: SessionViewer,
        day: Option<NaiveDate>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError> {
        let subject = self
            .subjects
            .find_by_id(subject_id)
            .await?
            .ok_or(AttendanceServiceError::SubjectNotFound)?;
        viewer.authorize_owner(subject.teacher_id)?;
        self.records
            .list_by_subject(subject.id, day, sort, page)
            .await
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::repository::{
    AttendanceRecordRepository, Clock, QrSessionRepository, ScanWrite, SubjectPort,
};
use crate::domain::types::{
    AcceptedScan, AttendanceRecord, DeviceInfo, QrSession, ScanEntry, ScanLocation,
    ScanRejection, Subject, calendar_day,
};
use crate::error::AttendanceServiceError;
use crate::usecase::record::RecordAttendanceUseCase;

#[derive(Debug, Clone)]
pub struct ScanInput {
    pub code: String,
    pub token: String,
    pub student_id: Uuid,
    pub location: Option<ScanLocation>,
    pub device_info: Option<DeviceInfo>,
}

impl ScanInput {
    fn validate(&self) -> Result<(), AttendanceServiceError> {
        if self.code.trim().is_empty() || self.token.trim().is_empty() {
            return Err(AttendanceServiceError::InvalidInput(
                "code and token are required".to_owned(),
            ));
        }
        if let Some(location) = &self.location {
            location
                .coordinates()
                .validate()
                .map_err(|e| AttendanceServiceError::InvalidInput(e.to_string()))?;
        }
        Ok(())
    }
}

// ── ScanValidator ────────────────────────────────────────────────────────────

/// Read-time checks of a scan against a found session, in evaluation order.
pub struct ScanValidator<'a> {
    pub session: &'a QrSession,
    pub subject: &'a Subject,
    pub student_id: Uuid,
    pub location: Option<&'a ScanLocation>,
    pub now: DateTime<Utc>,
}

type Check = fn(&ScanValidator<'_>) -> bool;

fn session_open(v: &ScanValidator<'_>) -> bool {
    v.session.is_open(v.now)
}

fn enrolled(v: &ScanValidator<'_>) -> bool {
    v.subject.is_enrolled(v.student_id)
}

fn in_range(v: &ScanValidator<'_>) -> bool {
    v.session.admits_location(v.location)
}

fn first_scan(v: &ScanValidator<'_>) -> bool {
    !v.session.has_scanned(v.student_id)
}

fn below_cap(v: &ScanValidator<'_>) -> bool {
    !v.session.is_full()
}

const CHECKS: [(ScanRejection, Check); 5] = [
    (ScanRejection::SessionExpired, session_open),
    (ScanRejection::NotEnrolled, enrolled),
    (ScanRejection::OutOfRange, in_range),
    (ScanRejection::AlreadyScanned, first_scan),
    (ScanRejection::LimitReached, below_cap),
];

impl ScanValidator<'_> {
    /// Fail-fast: the first violated check, if any.
    pub fn first_violation(&self) -> Option<ScanRejection> {
        CHECKS
            .iter()
            .find(|(_, passes)| !passes(self))
            .map(|(rejection, _)| *rejection)
    }

    /// Every violated check, in evaluation order.
    pub fn violations(&self) -> Vec<ScanRejection> {
        CHECKS
            .iter()
            .filter(|(_, passes)| !passes(self))
            .map(|(rejection, _)| *rejection)
            .collect()
    }
}

// ── SubmitScan ───────────────────────────────────────────────────────────────

pub struct SubmitScanUseCase<Q, S, R, C>
where
    Q: QrSessionRepository,
    S: SubjectPort,
    R: AttendanceRecordRepository,
    C: Clock,
{
    pub sessions: Q,
    pub subjects: S,
    pub recorder: RecordAttendanceUseCase<R, C>,
}

impl<Q, S, R, C> SubmitScanUseCase<Q, S, R, C>
where
    Q: QrSessionRepository,
    S: SubjectPort,
    R: AttendanceRecordRepository,
    C: Clock,
{
    /// Validate, accept and record a scan.
    ///
    /// A failure after the scan was accepted is reported as `RecordingIncomplete`;
    /// the caller then retries recording alone and must not resubmit the scan.
    pub async fn execute(
        &self,
        input: ScanInput,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        input.validate()?;

        let session = self
            .sessions
            .find_by_credentials(&input.code, &input.token)
            .await?
            .ok_or(AttendanceServiceError::SessionNotFound)?;

        let subject = self
            .subjects
            .find_by_id(session.subject_id)
            .await?
            .ok_or(AttendanceServiceError::SubjectNotFound)?;

        let validator = ScanValidator {
            session: &session,
            subject: &subject,
            student_id: input.student_id,
            location: input.location.as_ref(),
            now: self.recorder.clock.now(),
        };
        if let Some(rejection) = validator.first_violation() {
            tracing::debug!(
                session_id = %session.id,
                student_id = %input.student_id,
                ?rejection,
                "scan rejected"
            );
            return Err(rejection.into());
        }

        // Expiry is judged again against the clock at write time.
        let entry = ScanEntry {
            student_id: input.student_id,
            scanned_at: self.recorder.clock.now(),
            location: input.location,
            device_info: input.device_info,
        };
        match self.sessions.append_scan(session.id, &entry).await? {
            ScanWrite::Accepted { scan_count, active } => {
                tracing::info!(
                    session_id = %session.id,
                    student_id = %entry.student_id,
                    scan_count,
                    active,
                    "scan accepted"
                );
            }
            ScanWrite::Rejected(rejection) => {
                tracing::debug!(
                    session_id = %session.id,
                    student_id = %entry.student_id,
                    ?rejection,
                    "scan lost the conditional write"
                );
                return Err(rejection.into());
            }
        }

        let accepted = AcceptedScan::new(&session, &entry);
        self.recorder
            .record_scan(accepted, &subject.name)
            .await
            .map_err(|e| {
                tracing::warn!(
                    session_id = %session.id,
                    student_id = %entry.student_id,
                    error = %e,
                    "scan accepted but recording failed"
                );
                AttendanceServiceError::RecordingIncomplete
            })
    }
}

// ── CheckScan ────────────────────────────────────────────────────────────────

pub struct CheckScanUseCase<Q, S, C>
where
    Q: QrSessionRepository,
    S: SubjectPort,
    C: Clock,
{
    pub sessions: Q,
    pub subjects: S,
    pub clock: C,
}

impl<Q, S, C> CheckScanUseCase<Q, S, C>
where
    Q: QrSessionRepository,
    S: SubjectPort,
    C: Clock,
{
    /// Evaluate every check without writing anything. Empty means a scan would
    /// currently be accepted.
    pub async fn execute(
        &self,
        input: ScanInput,
    ) -> Result<Vec<ScanRejection>, AttendanceServiceError> {
        input.validate()?;

        let Some(session) = self
            .sessions
            .find_by_credentials(&input.code, &input.token)
            .await?
        else {
            return Ok(vec![ScanRejection::SessionNotFound]);
        };

        let subject = self
            .subjects
            .find_by_id(session.subject_id)
            .await?
            .ok_or(AttendanceServiceError::SubjectNotFound)?;

        Ok(ScanValidator {
            session: &session,
            subject: &subject,
            student_id: input.student_id,
            location: input.location.as_ref(),
            now: self.clock.now(),
        }
        .violations())
    }
}

// ── RetryRecording ───────────────────────────────────────────────────────────

pub struct RetryRecordingUseCase<Q, S, R, C>
where
    Q: QrSessionRepository,
    S: SubjectPort,
    R: AttendanceRecordRepository,
    C: Clock,
{
    pub sessions: Q,
    pub subjects: S,
    pub recorder: RecordAttendanceUseCase<R, C>,
}

impl<Q, S, R, C> RetryRecordingUseCase<Q, S, R, C>
where
    Q: QrSessionRepository,
    S: SubjectPort,
    R: AttendanceRecordRepository,
    C: Clock,
{
    /// Re-run only the recording step from the stored scan entry. Works after the
    /// session has expired, since acceptance already happened.
    ///
    /// A record for the day marked at or after the scan is returned as is: either
    /// this scan was already recorded or staff overrode it since.
    pub async fn execute(
        &self,
        code: &str,
        token: &str,
        student_id: Uuid,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        let session = self
            .sessions
            .find_by_credentials(code, token)
            .await?
            .ok_or(AttendanceServiceError::SessionNotFound)?;
        let entry = session
            .scan_of(student_id)
            .ok_or(AttendanceServiceError::ScanNotFound)?;

        if let Some(existing) = self
            .recorder
            .records
            .find_by_key(student_id, session.subject_id, calendar_day(entry.scanned_at))
            .await?
        {
            if existing.marked_at >= entry.scanned_at {
                tracing::debug!(
                    record_id = %existing.id,
                    session_id = %session.id,
                    "recording already settled"
                );
                return Ok(existing);
            }
        }

        let subject = self
            .subjects
            .find_by_id(session.subject_id)
            .await?
            .ok_or(AttendanceServiceError::SubjectNotFound)?;

        self.recorder
            .record_scan(AcceptedScan::new(&session, entry), &subject.name)
            .await
    }
}

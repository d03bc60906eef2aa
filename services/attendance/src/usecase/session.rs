use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use uuid::Uuid;

use rollcall_domain::geo::Geofence;

use crate::domain::repository::{Clock, QrSessionRepository, SubjectPort};
use crate::domain::types::{
    ClassWindow, MAX_EXPIRY_MINUTES, MAX_ISSUE_ATTEMPTS, MAX_SCAN_CAP, QrSession,
    SESSION_CODE_LEN, SESSION_TOKEN_BYTES,
};
use crate::error::AttendanceServiceError;

/// Charset for session codes (uppercase alphanumeric).
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..SESSION_CODE_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

fn generate_token() -> String {
    let bytes: [u8; SESSION_TOKEN_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

// ── IssueSession ─────────────────────────────────────────────────────────────

pub struct IssueSessionInput {
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub class_start: DateTime<Utc>,
    pub class_end: DateTime<Utc>,
    pub geofence: Option<Geofence>,
    /// Defaults to the service-wide expiry when absent.
    pub expiry_minutes: Option<i64>,
    pub max_scans: Option<u32>,
}

impl IssueSessionInput {
    fn validate(&self) -> Result<(), AttendanceServiceError> {
        if self.class_end <= self.class_start {
            return Err(AttendanceServiceError::InvalidInput(
                "class_end must be after class_start".to_owned(),
            ));
        }
        if self
            .expiry_minutes
            .is_some_and(|m| !(1..=MAX_EXPIRY_MINUTES).contains(&m))
        {
            return Err(AttendanceServiceError::InvalidInput(format!(
                "expiry_minutes must be between 1 and {MAX_EXPIRY_MINUTES}"
            )));
        }
        if self
            .max_scans
            .is_some_and(|m| !(1..=MAX_SCAN_CAP).contains(&m))
        {
            return Err(AttendanceServiceError::InvalidInput(format!(
                "max_scans must be between 1 and {MAX_SCAN_CAP}"
            )));
        }
        if let Some(fence) = &self.geofence {
            fence
                .validate()
                .map_err(|e| AttendanceServiceError::InvalidInput(e.to_string()))?;
        }
        Ok(())
    }
}

pub struct IssueSessionUseCase<S, Q, C>
where
    S: SubjectPort,
    Q: QrSessionRepository,
    C: Clock,
{
    pub subjects: S,
    pub sessions: Q,
    pub clock: C,
    pub default_expiry_minutes: i64,
}

impl<S, Q, C> IssueSessionUseCase<S, Q, C>
where
    S: SubjectPort,
    Q: QrSessionRepository,
    C: Clock,
{
    pub async fn execute(
        &self,
        input: IssueSessionInput,
    ) -> Result<QrSession, AttendanceServiceError> {
        input.validate()?;

        let subject = self
            .subjects
            .find_by_id(input.subject_id)
            .await?
            .ok_or(AttendanceServiceError::SubjectNotFound)?;
        if subject.teacher_id != input.teacher_id {
            return Err(AttendanceServiceError::Forbidden);
        }

        let now = self.clock.now();
        let minutes = input
            .expiry_minutes
            .unwrap_or(self.default_expiry_minutes)
            .clamp(1, MAX_EXPIRY_MINUTES);

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let session = QrSession {
                id: Uuid::new_v4(),
                code: generate_code(),
                token: generate_token(),
                subject_id: subject.id,
                teacher_id: input.teacher_id,
                class_window: ClassWindow {
                    start: input.class_start,
                    end: input.class_end,
                },
                geofence: input.geofence.clone(),
                expires_at: now + Duration::minutes(minutes),
                max_scans: input.max_scans,
                scan_count: 0,
                scans: vec![],
                active: true,
                created_at: now,
            };

            if self.sessions.try_create(&session).await? {
                tracing::info!(
                    session_id = %session.id,
                    subject_id = %session.subject_id,
                    expires_at = %session.expires_at,
                    "attendance session issued"
                );
                return Ok(session);
            }
            tracing::warn!(attempt, "session code collision, redrawing");
        }

        Err(AttendanceServiceError::IssuanceFailed)
    }
}

// ── GetSession / CloseSession ────────────────────────────────────────────────

/// Who is asking: staff may only act on what they own unless they are admins.
#[derive(Debug, Clone, Copy)]
pub struct SessionViewer {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl SessionViewer {
    pub fn authorize_owner(&self, teacher_id: Uuid) -> Result<(), AttendanceServiceError> {
        if self.is_admin || teacher_id == self.user_id {
            Ok(())
        } else {
            Err(AttendanceServiceError::Forbidden)
        }
    }
}

pub struct GetSessionUseCase<Q: QrSessionRepository> {
    pub sessions: Q,
}

impl<Q: QrSessionRepository> GetSessionUseCase<Q> {
    pub async fn execute(
        &self,
        session_id: Uuid,
        viewer: SessionViewer,
    ) -> Result<QrSession, AttendanceServiceError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or(AttendanceServiceError::SessionNotFound)?;
        viewer.authorize_owner(session.teacher_id)?;
        Ok(session)
    }
}

pub struct CloseSessionUseCase<Q: QrSessionRepository> {
    pub sessions: Q,
}

impl<Q: QrSessionRepository> CloseSessionUseCase<Q> {
    /// Stop accepting scans. Closing an already inactive session is a no-op.
    pub async fn execute(
        &self,
        session_id: Uuid,
        viewer: SessionViewer,
    ) -> Result<(), AttendanceServiceError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or(AttendanceServiceError::SessionNotFound)?;
        viewer.authorize_owner(session.teacher_id)?;
        if self.sessions.deactivate(session.id).await? {
            tracing::info!(session_id = %session.id, "attendance session closed");
        }
        Ok(())
    }
}

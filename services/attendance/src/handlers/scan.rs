use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_auth_types::identity::IdentityHeaders;
use rollcall_domain::attendance::AttendanceStatus;

use crate::domain::types::{AttendanceRecord, DeviceInfo, ScanLocation};
use crate::error::AttendanceServiceError;
use crate::handlers::require_student;
use crate::state::AppState;
use crate::usecase::scan::{
    CheckScanUseCase, RetryRecordingUseCase, ScanInput, SubmitScanUseCase,
};

#[derive(Deserialize)]
pub struct ScanRequest {
    pub code: String,
    pub token: String,
    pub location: Option<ScanLocation>,
    pub device_info: Option<DeviceInfo>,
}

#[derive(Deserialize)]
pub struct RetryRecordingRequest {
    pub code: String,
    pub token: String,
}

#[derive(Serialize)]
pub struct MarkedResponse {
    pub status: AttendanceStatus,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub marked_at: DateTime<Utc>,
}

impl From<AttendanceRecord> for MarkedResponse {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            status: record.status,
            marked_at: record.marked_at,
        }
    }
}

#[derive(Serialize)]
pub struct CheckScanResponse {
    pub accepted: bool,
    /// Rejection kinds in evaluation order.
    pub reasons: Vec<&'static str>,
}

impl ScanRequest {
    fn into_input(self, identity: &IdentityHeaders) -> ScanInput {
        ScanInput {
            code: self.code,
            token: self.token,
            student_id: identity.user_id,
            location: self.location,
            device_info: self.device_info,
        }
    }
}

// ── POST /attendance/scans ───────────────────────────────────────────────────

pub async fn submit_scan(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<ScanRequest>,
) -> Result<Json<MarkedResponse>, AttendanceServiceError> {
    require_student(&identity)?;
    let usecase = SubmitScanUseCase {
        sessions: state.session_repo(),
        subjects: state.subjects(),
        recorder: state.recorder(),
    };
    let record = usecase.execute(body.into_input(&identity)).await?;
    Ok(Json(record.into()))
}

// ── POST /attendance/scans/check ─────────────────────────────────────────────

pub async fn check_scan(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<ScanRequest>,
) -> Result<Json<CheckScanResponse>, AttendanceServiceError> {
    require_student(&identity)?;
    let usecase = CheckScanUseCase {
        sessions: state.session_repo(),
        subjects: state.subjects(),
        clock: state.clock(),
    };
    let violations = usecase.execute(body.into_input(&identity)).await?;
    Ok(Json(CheckScanResponse {
        accepted: violations.is_empty(),
        reasons: violations
            .into_iter()
            .map(|r| AttendanceServiceError::from(r).kind())
            .collect(),
    }))
}

// ── POST /attendance/scans/record ────────────────────────────────────────────

pub async fn retry_recording(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<RetryRecordingRequest>,
) -> Result<Json<MarkedResponse>, AttendanceServiceError> {
    require_student(&identity)?;
    let usecase = RetryRecordingUseCase {
        sessions: state.session_repo(),
        subjects: state.subjects(),
        recorder: state.recorder(),
    };
    let record = usecase
        .execute(&body.code, &body.token, identity.user_id)
        .await?;
    Ok(Json(record.into()))
}

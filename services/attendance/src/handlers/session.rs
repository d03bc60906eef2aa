use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rollcall_auth_types::identity::IdentityHeaders;
use rollcall_domain::geo::{Coordinates, Geofence};

use crate::domain::types::{DeviceInfo, QrSession, ScanLocation};
use crate::error::AttendanceServiceError;
use crate::handlers::require_staff;
use crate::state::AppState;
use crate::usecase::session::{
    CloseSessionUseCase, GetSessionUseCase, IssueSessionInput, IssueSessionUseCase,
};

// ── Request / response types ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct GeofenceRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Absent or `0` disables the radius check.
    pub radius_meters: Option<f64>,
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct IssueSessionRequest {
    pub subject_id: Uuid,
    pub class_start: DateTime<Utc>,
    pub class_end: DateTime<Utc>,
    pub geofence: Option<GeofenceRequest>,
    pub expiry_minutes: Option<i64>,
    pub max_scans: Option<u32>,
}

/// What the client renders into the QR image.
#[derive(Serialize)]
pub struct QrPayload {
    pub code: String,
    pub token: String,
    pub subject_id: Uuid,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub issued_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct IssueSessionResponse {
    pub session_id: Uuid,
    pub code: String,
    pub token: String,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    pub qr_payload: QrPayload,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub student_id: Uuid,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub scanned_at: DateTime<Utc>,
    pub location: Option<ScanLocation>,
    pub device_info: Option<DeviceInfo>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub class_start: DateTime<Utc>,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub class_end: DateTime<Utc>,
    pub geofence: Option<Geofence>,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    pub max_scans: Option<u32>,
    pub scan_count: u32,
    pub active: bool,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    pub scans: Vec<ScanResponse>,
}

impl From<QrSession> for SessionResponse {
    fn from(session: QrSession) -> Self {
        Self {
            session_id: session.id,
            subject_id: session.subject_id,
            teacher_id: session.teacher_id,
            class_start: session.class_window.start,
            class_end: session.class_window.end,
            geofence: session.geofence,
            expires_at: session.expires_at,
            max_scans: session.max_scans,
            scan_count: session.scan_count,
            active: session.active,
            created_at: session.created_at,
            scans: session
                .scans
                .into_iter()
                .map(|scan| ScanResponse {
                    student_id: scan.student_id,
                    scanned_at: scan.scanned_at,
                    location: scan.location,
                    device_info: scan.device_info,
                })
                .collect(),
        }
    }
}

// ── POST /attendance/sessions ────────────────────────────────────────────────

pub async fn issue_session(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<IssueSessionRequest>,
) -> Result<(StatusCode, Json<IssueSessionResponse>), AttendanceServiceError> {
    require_staff(&identity)?;

    let usecase = IssueSessionUseCase {
        subjects: state.subjects(),
        sessions: state.session_repo(),
        clock: state.clock(),
        default_expiry_minutes: state.default_expiry_minutes,
    };
    let session = usecase
        .execute(IssueSessionInput {
            subject_id: body.subject_id,
            teacher_id: identity.user_id,
            class_start: body.class_start,
            class_end: body.class_end,
            geofence: body.geofence.map(|g| Geofence {
                center: Coordinates {
                    latitude: g.latitude,
                    longitude: g.longitude,
                },
                radius_meters: g.radius_meters,
                address: g.address,
            }),
            expiry_minutes: body.expiry_minutes,
            max_scans: body.max_scans,
        })
        .await?;

    let response = IssueSessionResponse {
        session_id: session.id,
        code: session.code.clone(),
        token: session.token.clone(),
        expires_at: session.expires_at,
        qr_payload: QrPayload {
            code: session.code,
            token: session.token,
            subject_id: session.subject_id,
            issued_at: session.created_at,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

// ── GET /attendance/sessions/{session_id} ────────────────────────────────────

pub async fn get_session(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AttendanceServiceError> {
    let viewer = require_staff(&identity)?;
    let usecase = GetSessionUseCase {
        sessions: state.session_repo(),
    };
    let session = usecase.execute(session_id, viewer).await?;
    Ok(Json(session.into()))
}

// ── DELETE /attendance/sessions/{session_id} ─────────────────────────────────

pub async fn close_session(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AttendanceServiceError> {
    let viewer = require_staff(&identity)?;
    let usecase = CloseSessionUseCase {
        sessions: state.session_repo(),
    };
    usecase.execute(session_id, viewer).await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::types::ScanRejection;

/// Attendance service error variants.
///
/// Scan rejections (`SessionNotFound` … `LimitReached`) are expected outcomes and
/// carry a message the student can act on.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceServiceError {
    #[error("subject not found")]
    SubjectNotFound,
    #[error("could not issue a unique session code")]
    IssuanceFailed,
    #[error("attendance session not found")]
    SessionNotFound,
    #[error("attendance session has expired")]
    SessionExpired,
    #[error("you are not enrolled in this subject")]
    NotEnrolled,
    #[error("you are outside the permitted radius")]
    OutOfRange,
    #[error("you have already scanned this session")]
    AlreadyScanned,
    #[error("attendance session is full")]
    LimitReached,
    #[error("no accepted scan for this session")]
    ScanNotFound,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("forbidden")]
    Forbidden,
    #[error("attendance record is busy, try again")]
    PersistenceConflict,
    #[error("scan accepted but attendance was not recorded, retry recording")]
    RecordingIncomplete,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AttendanceServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubjectNotFound => "SUBJECT_NOT_FOUND",
            Self::IssuanceFailed => "ISSUANCE_FAILED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::NotEnrolled => "NOT_ENROLLED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::AlreadyScanned => "ALREADY_SCANNED",
            Self::LimitReached => "LIMIT_REACHED",
            Self::ScanNotFound => "SCAN_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Forbidden => "FORBIDDEN",
            Self::PersistenceConflict => "PERSISTENCE_CONFLICT",
            Self::RecordingIncomplete => "RECORDING_INCOMPLETE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::SubjectNotFound | Self::SessionNotFound | Self::ScanNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::SessionExpired => StatusCode::GONE,
            Self::NotEnrolled | Self::OutOfRange | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::AlreadyScanned | Self::LimitReached => StatusCode::CONFLICT,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::PersistenceConflict | Self::RecordingIncomplete => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::IssuanceFailed | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ScanRejection> for AttendanceServiceError {
    fn from(rejection: ScanRejection) -> Self {
        match rejection {
            ScanRejection::SessionNotFound => Self::SessionNotFound,
            ScanRejection::SessionExpired => Self::SessionExpired,
            ScanRejection::NotEnrolled => Self::NotEnrolled,
            ScanRejection::OutOfRange => Self::OutOfRange,
            ScanRejection::AlreadyScanned => Self::AlreadyScanned,
            ScanRejection::LimitReached => Self::LimitReached,
        }
    }
}

impl IntoResponse for AttendanceServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 4xx are business outcomes and already visible in the trace layer.
        if status.is_server_error() {
            match &self {
                Self::Internal(e) => {
                    tracing::error!(error = %e, kind = self.kind(), "internal error")
                }
                other => tracing::error!(kind = other.kind(), "{other}"),
            }
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

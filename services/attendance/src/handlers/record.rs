use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rollcall_auth_types::identity::IdentityHeaders;
use rollcall_domain::attendance::AttendanceStatus;
use rollcall_domain::pagination::{PageRequest, Sort};

use crate::domain::types::AttendanceRecord;
use crate::error::AttendanceServiceError;
use crate::handlers::{require_staff, require_student};
use crate::state::AppState;
use crate::usecase::record::{
    ListStudentRecordsUseCase, ListSubjectRecordsUseCase, ManualMarkInput, ManualMarkUseCase,
};

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RecordResponse {
    pub record_id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(serialize_with = "rollcall_core::serde::to_rfc3339_ms")]
    pub marked_at: DateTime<Utc>,
    /// `null` for manual marks.
    pub source_session_id: Option<Uuid>,
}

impl From<AttendanceRecord> for RecordResponse {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            record_id: record.id,
            student_id: record.student_id,
            subject_id: record.subject_id,
            day: record.day,
            status: record.status,
            marked_at: record.marked_at,
            source_session_id: record.source_session_id,
        }
    }
}

// ── Query params ─────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct MyRecordsQuery {
    pub subject_id: Option<Uuid>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
    pub sort: Option<Sort>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SubjectRecordsQuery {
    pub day: Option<NaiveDate>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
    pub sort: Option<Sort>,
}

fn page_request(per_page: Option<u32>, page: Option<u32>) -> PageRequest {
    let defaults = PageRequest::default();
    PageRequest {
        per_page: per_page.unwrap_or(defaults.per_page),
        page: page.unwrap_or(defaults.page),
    }
}

// ── GET /attendance/records/@me ──────────────────────────────────────────────

pub async fn list_my_records(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Query(query): Query<MyRecordsQuery>,
) -> Result<Json<Vec<RecordResponse>>, AttendanceServiceError> {
    require_student(&identity)?;
    let usecase = ListStudentRecordsUseCase {
        records: state.record_repo(),
    };
    let records = usecase
        .execute(
            identity.user_id,
            query.subject_id,
            query.sort.unwrap_or_default(),
            page_request(query.per_page, query.page),
        )
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

// ── GET /attendance/subjects/{subject_id}/records ────────────────────────────

pub async fn list_subject_records(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
    Query(query): Query<SubjectRecordsQuery>,
) -> Result<Json<Vec<RecordResponse>>, AttendanceServiceError> {
    let viewer = require_staff(&identity)?;
    let usecase = ListSubjectRecordsUseCase {
        subjects: state.subjects(),
        records: state.record_repo(),
    };
    let records = usecase
        .execute(
            subject_id,
            viewer,
            query.day,
            query.sort.unwrap_or_default(),
            page_request(query.per_page, query.page),
        )
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

// ── PUT /attendance/subjects/{subject_id}/records ────────────────────────────

#[derive(Deserialize)]
pub struct ManualMarkRequest {
    pub student_id: Uuid,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
}

pub async fn mark_record(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
    Json(body): Json<ManualMarkRequest>,
) -> Result<Json<RecordResponse>, AttendanceServiceError> {
    let actor = require_staff(&identity)?;
    let usecase = ManualMarkUseCase {
        subjects: state.subjects(),
        recorder: state.recorder(),
    };
    let record = usecase
        .execute(ManualMarkInput {
            subject_id,
            student_id: body.student_id,
            day: body.day,
            status: body.status,
            actor,
        })
        .await?;
    Ok(Json(record.into()))
}

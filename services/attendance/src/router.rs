use axum::{
    Router,
    routing::{get, post},
};

use rollcall_core::health::healthz;
use rollcall_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    health::readyz,
    record::{list_my_records, list_subject_records, mark_record},
    scan::{check_scan, retry_recording, submit_scan},
    session::{close_session, get_session, issue_session},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Sessions
        .route("/attendance/sessions", post(issue_session))
        .route(
            "/attendance/sessions/{session_id}",
            get(get_session).delete(close_session),
        )
        // Scans
        .route("/attendance/scans", post(submit_scan))
        .route("/attendance/scans/check", post(check_scan))
        .route("/attendance/scans/record", post(retry_recording))
        // Records
        .route("/attendance/records/@me", get(list_my_records))
        .route(
            "/attendance/subjects/{subject_id}/records",
            get(list_subject_records).put(mark_record),
        )
        .layer(propagate_request_id_layer())
        .layer(trace_layer())
        .layer(request_id_layer())
        .with_state(state)
}

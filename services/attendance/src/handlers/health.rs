use axum::{extract::State, http::StatusCode};

use rollcall_core::health::readiness;

use crate::state::AppState;

/// `GET /readyz`: ready once the database answers.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    readiness(state.db.ping().await)
}

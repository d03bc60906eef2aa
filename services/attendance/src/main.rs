use std::time::Duration;

use sea_orm::Database;
use tracing::info;

use rollcall_attendance::config::AttendanceConfig;
use rollcall_attendance::infra::grpc::GrpcSubjectPort;
use rollcall_attendance::router::build_router;
use rollcall_attendance::state::AppState;
use rollcall_attendance::sweeper;

#[tokio::main]
async fn main() {
    rollcall_core::tracing::init_tracing();

    let config = AttendanceConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let subjects_channel = tonic::transport::Channel::from_shared(config.subjects_grpc_url.clone())
        .expect("invalid SUBJECTS_GRPC_URL")
        .connect_lazy();

    let state = AppState {
        db,
        subject_port: GrpcSubjectPort::new(subjects_channel),
        default_expiry_minutes: config.default_expiry_minutes,
    };

    // Expiry sweep
    tokio::spawn(sweeper::run(
        state.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
        chrono::Duration::days(config.session_retention_days),
    ));

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.attendance_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("attendance service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}

use sea_orm::DatabaseConnection;

use crate::infra::clock::SystemClock;
use crate::infra::db::{DbAttendanceRecordRepository, DbQrSessionRepository};
use crate::infra::grpc::GrpcSubjectPort;
use crate::usecase::record::RecordAttendanceUseCase;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub subject_port: GrpcSubjectPort,
    pub default_expiry_minutes: i64,
}

impl AppState {
    pub fn session_repo(&self) -> DbQrSessionRepository {
        DbQrSessionRepository {
            db: self.db.clone(),
        }
    }

    pub fn record_repo(&self) -> DbAttendanceRecordRepository {
        DbAttendanceRecordRepository {
            db: self.db.clone(),
        }
    }

    pub fn subjects(&self) -> GrpcSubjectPort {
        self.subject_port.clone()
    }

    pub fn clock(&self) -> SystemClock {
        SystemClock
    }

    pub fn recorder(&self) -> RecordAttendanceUseCase<DbAttendanceRecordRepository, SystemClock> {
        RecordAttendanceUseCase {
            records: self.record_repo(),
            clock: self.clock(),
        }
    }
}

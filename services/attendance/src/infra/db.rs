use anyhow::Context as _;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr, TransactionTrait, UpdateMany,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use rollcall_attendance_schema::{attendance_records, outbox_events, qr_scans, qr_sessions};
use rollcall_domain::geo::{Coordinates, Geofence};
use rollcall_domain::pagination::{PageRequest, Sort};

use crate::domain::repository::{AttendanceRecordRepository, QrSessionRepository, ScanWrite};
use crate::domain::types::{
    AttendanceRecord, ClassWindow, DeviceInfo, OutboxEvent, QrSession, ScanEntry, ScanLocation,
    ScanRejection,
};
use crate::error::AttendanceServiceError;

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

// ── QR session repository ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbQrSessionRepository {
    pub db: DatabaseConnection,
}

impl DbQrSessionRepository {
    async fn load_scans(&self, session_id: Uuid) -> Result<Vec<ScanEntry>, AttendanceServiceError> {
        let models = qr_scans::Entity::find()
            .filter(qr_scans::Column::SessionId.eq(session_id))
            .order_by_asc(qr_scans::Column::Seq)
            .all(&self.db)
            .await
            .context("load session scans")?;
        Ok(models.into_iter().map(scan_from_model).collect())
    }

    async fn with_scans(
        &self,
        model: Option<qr_sessions::Model>,
    ) -> Result<Option<QrSession>, AttendanceServiceError> {
        let Some(model) = model else {
            return Ok(None);
        };
        let scans = self.load_scans(model.id).await?;
        Ok(Some(session_from_model(model, scans)))
    }

    /// Explain why the conditional claim matched no row. Read outside the aborted
    /// transaction, so it reflects the latest committed state.
    async fn classify_rejection(
        &self,
        session_id: Uuid,
        student_id: Uuid,
    ) -> Result<ScanRejection, AttendanceServiceError> {
        let Some(session) = qr_sessions::Entity::find_by_id(session_id)
            .one(&self.db)
            .await
            .context("reload session after rejected claim")?
        else {
            return Ok(ScanRejection::SessionNotFound);
        };
        let scanned = qr_scans::Entity::find_by_id((session_id, student_id))
            .count(&self.db)
            .await
            .context("check existing scan")?;
        if scanned > 0 {
            return Ok(ScanRejection::AlreadyScanned);
        }
        if session
            .max_scans
            .is_some_and(|max| session.scan_count >= max)
        {
            return Ok(ScanRejection::LimitReached);
        }
        Ok(ScanRejection::SessionExpired)
    }
}

impl QrSessionRepository for DbQrSessionRepository {
    async fn try_create(&self, session: &QrSession) -> Result<bool, AttendanceServiceError> {
        let (latitude, longitude, radius_meters, address) = match &session.geofence {
            Some(fence) => (
                Some(fence.center.latitude),
                Some(fence.center.longitude),
                fence.radius_meters,
                fence.address.clone(),
            ),
            None => (None, None, None, None),
        };
        let max_scans = session
            .max_scans
            .map(i32::try_from)
            .transpose()
            .context("max_scans out of range")?;
        let result = qr_sessions::ActiveModel {
            id: Set(session.id),
            code: Set(session.code.clone()),
            token: Set(session.token.clone()),
            subject_id: Set(session.subject_id),
            teacher_id: Set(session.teacher_id),
            class_start: Set(session.class_window.start),
            class_end: Set(session.class_window.end),
            latitude: Set(latitude),
            longitude: Set(longitude),
            radius_meters: Set(radius_meters),
            address: Set(address),
            expires_at: Set(session.expires_at),
            max_scans: Set(max_scans),
            scan_count: Set(0),
            active: Set(true),
            created_at: Set(session.created_at),
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context("create qr session").into()),
        }
    }

    async fn find_by_credentials(
        &self,
        code: &str,
        token: &str,
    ) -> Result<Option<QrSession>, AttendanceServiceError> {
        let model = qr_sessions::Entity::find()
            .filter(qr_sessions::Column::Code.eq(code))
            .filter(qr_sessions::Column::Token.eq(token))
            .one(&self.db)
            .await
            .context("find qr session by credentials")?;
        self.with_scans(model).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<QrSession>, AttendanceServiceError> {
        let model = qr_sessions::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find qr session by id")?;
        self.with_scans(model).await
    }

    /// One transaction: claim a slot with a conditional `scan_count + 1`, insert the
    /// scan row with `ON CONFLICT DO NOTHING`, deactivate when the cap is hit.
    ///
    /// A claim matching no row is classified in order: `SessionNotFound`,
    /// `AlreadyScanned`, `LimitReached`, then `SessionExpired` (inactive or past
    /// `expires_at`). A claim whose scan row already exists rolls back as
    /// `AlreadyScanned`.
    async fn append_scan(
        &self,
        session_id: Uuid,
        entry: &ScanEntry,
    ) -> Result<ScanWrite, AttendanceServiceError> {
        let txn = self.db.begin().await.context("begin scan append")?;

        // The row lock serializes concurrent scans of one session.
        let claimed = claim_slot(session_id, entry.scanned_at)
            .exec(&txn)
            .await
            .context("claim scan slot")?;

        if claimed.rows_affected == 0 {
            txn.rollback().await.context("rollback rejected scan")?;
            let rejection = self.classify_rejection(session_id, entry.student_id).await?;
            return Ok(ScanWrite::Rejected(rejection));
        }

        let session = qr_sessions::Entity::find_by_id(session_id)
            .one(&txn)
            .await
            .context("read claimed session")?
            .ok_or_else(|| anyhow::anyhow!("claimed session {session_id} vanished"))?;

        if !insert_scan(&txn, session_id, session.scan_count, entry)
            .await
            .context("insert scan")?
        {
            txn.rollback().await.context("rollback duplicate scan")?;
            return Ok(ScanWrite::Rejected(ScanRejection::AlreadyScanned));
        }

        let full = session
            .max_scans
            .is_some_and(|max| session.scan_count >= max);
        if full {
            qr_sessions::Entity::update_many()
                .col_expr(qr_sessions::Column::Active, Expr::value(false))
                .filter(qr_sessions::Column::Id.eq(session_id))
                .exec(&txn)
                .await
                .context("deactivate full session")?;
        }

        txn.commit().await.context("commit scan append")?;
        Ok(ScanWrite::Accepted {
            scan_count: u32::try_from(session.scan_count).unwrap_or_default(),
            active: !full,
        })
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, AttendanceServiceError> {
        let result = qr_sessions::Entity::update_many()
            .col_expr(qr_sessions::Column::Active, Expr::value(false))
            .filter(qr_sessions::Column::Id.eq(id))
            .filter(qr_sessions::Column::Active.eq(true))
            .exec(&self.db)
            .await
            .context("deactivate qr session")?;
        Ok(result.rows_affected > 0)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AttendanceServiceError> {
        let result = qr_sessions::Entity::update_many()
            .col_expr(qr_sessions::Column::Active, Expr::value(false))
            .filter(qr_sessions::Column::Active.eq(true))
            .filter(qr_sessions::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("deactivate expired qr sessions")?;
        Ok(result.rows_affected)
    }

    async fn purge_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, AttendanceServiceError> {
        // qr_scans rows go with their session (ON DELETE CASCADE).
        let result = qr_sessions::Entity::delete_many()
            .filter(qr_sessions::Column::ExpiresAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("purge expired qr sessions")?;
        Ok(result.rows_affected)
    }
}

/// Conditional `scan_count + 1` on an open session with room left. Expiry is checked
/// against both the scan instant and the database clock once the row lock is held.
fn claim_slot(session_id: Uuid, scanned_at: DateTime<Utc>) -> UpdateMany<qr_sessions::Entity> {
    qr_sessions::Entity::update_many()
        .col_expr(
            qr_sessions::Column::ScanCount,
            Expr::col(qr_sessions::Column::ScanCount).add(1),
        )
        .filter(qr_sessions::Column::Id.eq(session_id))
        .filter(qr_sessions::Column::Active.eq(true))
        .filter(qr_sessions::Column::ExpiresAt.gt(scanned_at))
        .filter(Expr::col(qr_sessions::Column::ExpiresAt).gt(Expr::cust("clock_timestamp()")))
        .filter(
            Condition::any()
                .add(qr_sessions::Column::MaxScans.is_null())
                .add(
                    Expr::col(qr_sessions::Column::ScanCount)
                        .lt(Expr::col(qr_sessions::Column::MaxScans)),
                ),
        )
}

/// Returns `false` if the student already has a scan in this session.
async fn insert_scan(
    txn: &DatabaseTransaction,
    session_id: Uuid,
    seq: i32,
    entry: &ScanEntry,
) -> Result<bool, DbErr> {
    let scan = qr_scans::ActiveModel {
        session_id: Set(session_id),
        student_id: Set(entry.student_id),
        seq: Set(seq),
        scanned_at: Set(entry.scanned_at),
        latitude: Set(entry.location.map(|l| l.latitude)),
        longitude: Set(entry.location.map(|l| l.longitude)),
        accuracy: Set(entry.location.and_then(|l| l.accuracy)),
        user_agent: Set(entry.device_info.as_ref().and_then(|d| d.user_agent.clone())),
        device_type: Set(entry.device_info.as_ref().and_then(|d| d.device_type.clone())),
    };
    let inserted = qr_scans::Entity::insert(scan)
        .on_conflict(
            OnConflict::columns([qr_scans::Column::SessionId, qr_scans::Column::StudentId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;
    Ok(inserted > 0)
}

fn location_from_columns(
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
) -> Option<ScanLocation> {
    Some(ScanLocation {
        latitude: latitude?,
        longitude: longitude?,
        accuracy,
    })
}

fn device_from_columns(
    user_agent: Option<String>,
    device_type: Option<String>,
) -> Option<DeviceInfo> {
    if user_agent.is_none() && device_type.is_none() {
        return None;
    }
    Some(DeviceInfo {
        user_agent,
        device_type,
    })
}

fn scan_from_model(model: qr_scans::Model) -> ScanEntry {
    ScanEntry {
        student_id: model.student_id,
        scanned_at: model.scanned_at,
        location: location_from_columns(model.latitude, model.longitude, model.accuracy),
        device_info: device_from_columns(model.user_agent, model.device_type),
    }
}

fn session_from_model(model: qr_sessions::Model, scans: Vec<ScanEntry>) -> QrSession {
    let geofence = match (model.latitude, model.longitude) {
        (Some(latitude), Some(longitude)) => Some(Geofence {
            center: Coordinates {
                latitude,
                longitude,
            },
            radius_meters: model.radius_meters,
            address: model.address,
        }),
        _ => None,
    };
    QrSession {
        id: model.id,
        code: model.code,
        token: model.token,
        subject_id: model.subject_id,
        teacher_id: model.teacher_id,
        class_window: ClassWindow {
            start: model.class_start,
            end: model.class_end,
        },
        geofence,
        expires_at: model.expires_at,
        max_scans: model.max_scans.map(|m| u32::try_from(m).unwrap_or_default()),
        scan_count: u32::try_from(model.scan_count).unwrap_or_default(),
        scans,
        active: model.active,
        created_at: model.created_at,
    }
}

// ── Attendance record repository ─────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAttendanceRecordRepository {
    pub db: DatabaseConnection,
}

impl AttendanceRecordRepository for DbAttendanceRecordRepository {
    async fn upsert_with_outbox(
        &self,
        record: &AttendanceRecord,
        event: &OutboxEvent,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        let stored = self
            .db
            .transaction::<_, attendance_records::Model, DbErr>(|txn| {
                let record = record.clone();
                let event = event.clone();
                Box::pin(async move {
                    let stored = upsert_record(txn, &record).await?;
                    insert_outbox_event(txn, &event).await?;
                    Ok(stored)
                })
            })
            .await;

        match stored {
            Ok(model) => Ok(record_from_model(model)?),
            Err(sea_orm::TransactionError::Transaction(e)) if is_unique_violation(&e) => {
                Err(AttendanceServiceError::PersistenceConflict)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context("upsert attendance record with outbox")
                .into()),
        }
    }

    async fn find_by_key(
        &self,
        student_id: Uuid,
        subject_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, AttendanceServiceError> {
        let model = attendance_records::Entity::find()
            .filter(attendance_records::Column::StudentId.eq(student_id))
            .filter(attendance_records::Column::SubjectId.eq(subject_id))
            .filter(attendance_records::Column::Day.eq(day))
            .one(&self.db)
            .await
            .context("find attendance record by key")?;
        model.map(record_from_model).transpose()
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        subject_id: Option<Uuid>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError> {
        let mut query = attendance_records::Entity::find()
            .filter(attendance_records::Column::StudentId.eq(student_id));
        if let Some(subject_id) = subject_id {
            query = query.filter(attendance_records::Column::SubjectId.eq(subject_id));
        }
        query = match sort {
            Sort::Desc => query
                .order_by_desc(attendance_records::Column::Day)
                .order_by_desc(attendance_records::Column::MarkedAt),
            Sort::Asc => query
                .order_by_asc(attendance_records::Column::Day)
                .order_by_asc(attendance_records::Column::MarkedAt),
        };
        let models = query
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list attendance records by student")?;
        models.into_iter().map(record_from_model).collect()
    }

    async fn list_by_subject(
        &self,
        subject_id: Uuid,
        day: Option<NaiveDate>,
        sort: Sort,
        page: PageRequest,
    ) -> Result<Vec<AttendanceRecord>, AttendanceServiceError> {
        let mut query = attendance_records::Entity::find()
            .filter(attendance_records::Column::SubjectId.eq(subject_id));
        if let Some(day) = day {
            query = query.filter(attendance_records::Column::Day.eq(day));
        }
        query = match sort {
            Sort::Desc => query
                .order_by_desc(attendance_records::Column::Day)
                .order_by_asc(attendance_records::Column::StudentId),
            Sort::Asc => query
                .order_by_asc(attendance_records::Column::Day)
                .order_by_asc(attendance_records::Column::StudentId),
        };
        let models = query
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list attendance records by subject")?;
        models.into_iter().map(record_from_model).collect()
    }
}

/// Insert or overwrite by `(student_id, subject_id, day)`. On overwrite the row keeps
/// its id and `created_at`.
async fn upsert_record(
    txn: &DatabaseTransaction,
    record: &AttendanceRecord,
) -> Result<attendance_records::Model, DbErr> {
    let model = attendance_records::ActiveModel {
        id: Set(record.id),
        student_id: Set(record.student_id),
        subject_id: Set(record.subject_id),
        teacher_id: Set(record.teacher_id),
        day: Set(record.day),
        status: Set(record.status.as_str().to_owned()),
        marked_at: Set(record.marked_at),
        source_session_id: Set(record.source_session_id),
        latitude: Set(record.location.map(|l| l.latitude)),
        longitude: Set(record.location.map(|l| l.longitude)),
        accuracy: Set(record.location.and_then(|l| l.accuracy)),
        user_agent: Set(record.device_info.as_ref().and_then(|d| d.user_agent.clone())),
        device_type: Set(record.device_info.as_ref().and_then(|d| d.device_type.clone())),
        created_at: Set(record.created_at),
        updated_at: Set(record.updated_at),
    };
    attendance_records::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([
                attendance_records::Column::StudentId,
                attendance_records::Column::SubjectId,
                attendance_records::Column::Day,
            ])
            .update_columns([
                attendance_records::Column::TeacherId,
                attendance_records::Column::Status,
                attendance_records::Column::MarkedAt,
                attendance_records::Column::SourceSessionId,
                attendance_records::Column::Latitude,
                attendance_records::Column::Longitude,
                attendance_records::Column::Accuracy,
                attendance_records::Column::UserAgent,
                attendance_records::Column::DeviceType,
                attendance_records::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec_with_returning(txn)
        .await
}

/// The same decision replayed yields the same key, so the notification is queued once.
async fn insert_outbox_event(
    txn: &DatabaseTransaction,
    event: &OutboxEvent,
) -> Result<(), DbErr> {
    let now = Utc::now();
    let model = outbox_events::ActiveModel {
        id: Set(event.id),
        kind: Set(event.kind.clone()),
        payload: Set(event.payload.clone()),
        idempotency_key: Set(event.idempotency_key.clone()),
        attempts: Set(0),
        last_error: Set(None),
        created_at: Set(now),
        next_attempt_at: Set(now),
        processed_at: Set(None),
        failed_at: Set(None),
    };
    outbox_events::Entity::insert(model)
        .on_conflict(
            OnConflict::column(outbox_events::Column::IdempotencyKey)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;
    Ok(())
}

fn record_from_model(
    model: attendance_records::Model,
) -> Result<AttendanceRecord, AttendanceServiceError> {
    let status = model
        .status
        .parse()
        .with_context(|| format!("attendance record {}", model.id))?;
    Ok(AttendanceRecord {
        id: model.id,
        student_id: model.student_id,
        subject_id: model.subject_id,
        teacher_id: model.teacher_id,
        day: model.day,
        status,
        marked_at: model.marked_at,
        source_session_id: model.source_session_id,
        location: location_from_columns(model.latitude, model.longitude, model.accuracy),
        device_info: device_from_columns(model.user_agent, model.device_type),
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

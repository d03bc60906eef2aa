use sea_orm::entity::prelude::*;

/// Accepted scan of a QR session. The composite key makes a session single-use per
/// student; `seq` is the session's `scan_count` right after this scan was accepted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "qr_scans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: Uuid,
    pub seq: i32,
    pub scanned_at: chrono::DateTime<chrono::Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::qr_sessions::Entity",
        from = "Column::SessionId",
        to = "super::qr_sessions::Column::Id",
        on_delete = "Cascade"
    )]
    Session,
}

impl Related<super::qr_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

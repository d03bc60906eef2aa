use sea_orm::entity::prelude::*;

/// Short-lived QR credential for one class period.
/// `code` and `token` are each globally unique; rows are never updated except for
/// `scan_count` and a one-way `active` flip.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "qr_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(unique)]
    pub token: String,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub class_start: chrono::DateTime<chrono::Utc>,
    pub class_end: chrono::DateTime<chrono::Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_meters: Option<f64>,
    pub address: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub max_scans: Option<i32>,
    pub scan_count: i32,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::qr_scans::Entity")]
    Scans,
}

impl Related<super::qr_scans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Scans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

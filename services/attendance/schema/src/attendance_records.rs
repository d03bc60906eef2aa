use sea_orm::entity::prelude::*;

/// Day-level attendance of a student for a subject.
/// Unique on `(student_id, subject_id, day)`; re-marking overwrites in place.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Uuid,
    pub day: chrono::NaiveDate,
    /// One of `present`, `late`, `absent`, `excused`.
    pub status: String,
    pub marked_at: chrono::DateTime<chrono::Utc>,
    /// `None` for manual marks.
    pub source_session_id: Option<Uuid>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

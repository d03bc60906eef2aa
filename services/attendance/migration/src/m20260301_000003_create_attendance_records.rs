use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AttendanceRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttendanceRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AttendanceRecords::StudentId).uuid().not_null())
                    .col(ColumnDef::new(AttendanceRecords::SubjectId).uuid().not_null())
                    .col(ColumnDef::new(AttendanceRecords::TeacherId).uuid().not_null())
                    .col(ColumnDef::new(AttendanceRecords::Day).date().not_null())
                    .col(ColumnDef::new(AttendanceRecords::Status).string().not_null())
                    .col(
                        ColumnDef::new(AttendanceRecords::MarkedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AttendanceRecords::SourceSessionId).uuid())
                    .col(ColumnDef::new(AttendanceRecords::Latitude).double())
                    .col(ColumnDef::new(AttendanceRecords::Longitude).double())
                    .col(ColumnDef::new(AttendanceRecords::Accuracy).double())
                    .col(ColumnDef::new(AttendanceRecords::UserAgent).string())
                    .col(ColumnDef::new(AttendanceRecords::DeviceType).string())
                    .col(
                        ColumnDef::new(AttendanceRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttendanceRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Upsert conflict target.
        manager
            .create_index(
                Index::create()
                    .table(AttendanceRecords::Table)
                    .col(AttendanceRecords::StudentId)
                    .col(AttendanceRecords::SubjectId)
                    .col(AttendanceRecords::Day)
                    .unique()
                    .name("uq_attendance_records_student_subject_day")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(AttendanceRecords::Table)
                    .col(AttendanceRecords::SubjectId)
                    .col(AttendanceRecords::Day)
                    .name("idx_attendance_records_subject_day")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AttendanceRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AttendanceRecords {
    Table,
    Id,
    StudentId,
    SubjectId,
    TeacherId,
    Day,
    Status,
    MarkedAt,
    SourceSessionId,
    Latitude,
    Longitude,
    Accuracy,
    UserAgent,
    DeviceType,
    CreatedAt,
    UpdatedAt,
}

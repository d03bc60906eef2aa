use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QrSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QrSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(QrSessions::Code)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(QrSessions::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(QrSessions::SubjectId).uuid().not_null())
                    .col(ColumnDef::new(QrSessions::TeacherId).uuid().not_null())
                    .col(
                        ColumnDef::new(QrSessions::ClassStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QrSessions::ClassEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QrSessions::Latitude).double())
                    .col(ColumnDef::new(QrSessions::Longitude).double())
                    .col(ColumnDef::new(QrSessions::RadiusMeters).double())
                    .col(ColumnDef::new(QrSessions::Address).string())
                    .col(
                        ColumnDef::new(QrSessions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QrSessions::MaxScans).integer())
                    .col(
                        ColumnDef::new(QrSessions::ScanCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QrSessions::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(QrSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .check(Expr::col(QrSessions::ScanCount).gte(0))
                    .to_owned(),
            )
            .await?;

        // Sweep queries filter on expiry.
        manager
            .create_index(
                Index::create()
                    .table(QrSessions::Table)
                    .col(QrSessions::ExpiresAt)
                    .name("idx_qr_sessions_expires_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(QrSessions::Table)
                    .col(QrSessions::SubjectId)
                    .name("idx_qr_sessions_subject_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QrSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum QrSessions {
    Table,
    Id,
    Code,
    Token,
    SubjectId,
    TeacherId,
    ClassStart,
    ClassEnd,
    Latitude,
    Longitude,
    RadiusMeters,
    Address,
    ExpiresAt,
    MaxScans,
    ScanCount,
    Active,
    CreatedAt,
}

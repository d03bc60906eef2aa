use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QrScans::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(QrScans::SessionId).uuid().not_null())
                    .col(ColumnDef::new(QrScans::StudentId).uuid().not_null())
                    .col(ColumnDef::new(QrScans::Seq).integer().not_null())
                    .col(
                        ColumnDef::new(QrScans::ScannedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(QrScans::Latitude).double())
                    .col(ColumnDef::new(QrScans::Longitude).double())
                    .col(ColumnDef::new(QrScans::Accuracy).double())
                    .col(ColumnDef::new(QrScans::UserAgent).string())
                    .col(ColumnDef::new(QrScans::DeviceType).string())
                    // One scan per student per session.
                    .primary_key(
                        Index::create()
                            .col(QrScans::SessionId)
                            .col(QrScans::StudentId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(QrScans::Table, QrScans::SessionId)
                            .to(QrSessions::Table, QrSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QrScans::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum QrScans {
    Table,
    SessionId,
    StudentId,
    Seq,
    ScannedAt,
    Latitude,
    Longitude,
    Accuracy,
    UserAgent,
    DeviceType,
}

#[derive(Iden)]
enum QrSessions {
    Table,
    Id,
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IdempotencyRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdempotencyRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyRecords::TeamId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyRecords::IdempotencyKey)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyRecords::PayloadHash)
                            .char_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyRecords::Response)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyRecords::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(IdempotencyRecords::Table)
                    .col(IdempotencyRecords::TeamId)
                    .col(IdempotencyRecords::IdempotencyKey)
                    .unique()
                    .name("uq_idempotency_records_team_key")
                    .to_owned(),
            )
            .await?;

        // Cleanup sweep deletes by expiry.
        manager
            .create_index(
                Index::create()
                    .table(IdempotencyRecords::Table)
                    .col(IdempotencyRecords::ExpiresAt)
                    .name("idx_idempotency_records_expires_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IdempotencyRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IdempotencyRecords {
    Table,
    Id,
    TeamId,
    IdempotencyKey,
    PayloadHash,
    Response,
    CreatedAt,
    ExpiresAt,
}

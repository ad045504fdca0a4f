use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookCalls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookCalls::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebhookCalls::SubscriptionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookCalls::TeamId).big_integer().not_null())
                    .col(ColumnDef::new(WebhookCalls::EventId).uuid().not_null())
                    .col(ColumnDef::new(WebhookCalls::EventType).string().not_null())
                    .col(ColumnDef::new(WebhookCalls::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(WebhookCalls::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(WebhookCalls::Attempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(WebhookCalls::MaxAttempts).integer().not_null())
                    .col(ColumnDef::new(WebhookCalls::NextAttemptAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(WebhookCalls::ResponseStatus).integer())
                    .col(ColumnDef::new(WebhookCalls::ResponseBody).text())
                    .col(ColumnDef::new(WebhookCalls::ResponseTimeMs).big_integer())
                    .col(ColumnDef::new(WebhookCalls::LastError).text())
                    .col(
                        ColumnDef::new(WebhookCalls::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookCalls::LastAttemptAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(WebhookCalls::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(WebhookCalls::Table)
                    .col(WebhookCalls::SubscriptionId)
                    .col(WebhookCalls::CreatedAt)
                    .name("idx_webhook_calls_subscription_created")
                    .to_owned(),
            )
            .await?;

        // Retention sweep deletes by age.
        manager
            .create_index(
                Index::create()
                    .table(WebhookCalls::Table)
                    .col(WebhookCalls::CreatedAt)
                    .name("idx_webhook_calls_created_at")
                    .to_owned(),
            )
            .await?;

        // Recovery sweep scans by status and due time.
        manager
            .create_index(
                Index::create()
                    .table(WebhookCalls::Table)
                    .col(WebhookCalls::Status)
                    .col(WebhookCalls::NextAttemptAt)
                    .name("idx_webhook_calls_status_next_attempt_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookCalls::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum WebhookCalls {
    Table,
    Id,
    SubscriptionId,
    TeamId,
    EventId,
    EventType,
    Payload,
    Status,
    Attempt,
    MaxAttempts,
    NextAttemptAt,
    ResponseStatus,
    ResponseBody,
    ResponseTimeMs,
    LastError,
    CreatedAt,
    LastAttemptAt,
    UpdatedAt,
}

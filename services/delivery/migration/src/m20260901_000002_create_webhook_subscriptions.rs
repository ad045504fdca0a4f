use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookSubscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookSubscriptions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscriptions::TeamId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookSubscriptions::Url).text().not_null())
                    .col(
                        ColumnDef::new(WebhookSubscriptions::Secret)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscriptions::EventTypes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscriptions::DomainIds)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscriptions::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(WebhookSubscriptions::Description).string())
                    .col(
                        ColumnDef::new(WebhookSubscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookSubscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(WebhookSubscriptions::Table)
                    .col(WebhookSubscriptions::TeamId)
                    .name("idx_webhook_subscriptions_team_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookSubscriptions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum WebhookSubscriptions {
    Table,
    Id,
    TeamId,
    Url,
    Secret,
    EventTypes,
    DomainIds,
    Enabled,
    Description,
    CreatedAt,
    UpdatedAt,
}

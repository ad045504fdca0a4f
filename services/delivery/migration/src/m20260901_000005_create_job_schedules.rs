use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobSchedules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobSchedules::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobSchedules::Queue).string().not_null())
                    .col(ColumnDef::new(JobSchedules::ScheduleName).string().not_null())
                    .col(ColumnDef::new(JobSchedules::CronPattern).string().not_null())
                    .col(
                        ColumnDef::new(JobSchedules::Timezone)
                            .string()
                            .not_null()
                            .default("UTC"),
                    )
                    .col(ColumnDef::new(JobSchedules::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(JobSchedules::NextRunAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobSchedules::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobSchedules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(JobSchedules::Table)
                    .col(JobSchedules::Queue)
                    .col(JobSchedules::ScheduleName)
                    .unique()
                    .name("uq_job_schedules_queue_name")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobSchedules::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum JobSchedules {
    Table,
    Id,
    Queue,
    ScheduleName,
    CronPattern,
    Timezone,
    Payload,
    NextRunAt,
    CreatedAt,
    UpdatedAt,
}

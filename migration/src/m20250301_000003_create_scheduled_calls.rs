use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledCalls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScheduledCalls::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ScheduledCalls::SerializedCallRequest)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduledCalls::Schedule).string().not_null())
                    .col(ColumnDef::new(ScheduledCalls::Tags).json().not_null())
                    .col(
                        ColumnDef::new(ScheduledCalls::FirstRun)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ScheduledCalls::LastRun).timestamp_with_time_zone())
                    .col(ColumnDef::new(ScheduledCalls::NextRun).timestamp_with_time_zone())
                    .col(ColumnDef::new(ScheduledCalls::RemainingRuns).integer())
                    .col(ColumnDef::new(ScheduledCalls::FailureThreshold).integer())
                    .col(
                        ColumnDef::new(ScheduledCalls::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScheduledCalls::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ScheduledCalls::CallCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ScheduledCalls::CallExitStates).json().not_null())
                    .col(
                        ColumnDef::new(ScheduledCalls::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScheduledCalls::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 调度循环查询到期记录使用的索引
        manager
            .create_index(
                Index::create()
                    .name("idx_scheduled_calls_enabled_next_run")
                    .table(ScheduledCalls::Table)
                    .col(ScheduledCalls::Enabled)
                    .col(ScheduledCalls::NextRun)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_scheduled_calls_enabled_next_run")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ScheduledCalls::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScheduledCalls {
    Table,
    Id,
    SerializedCallRequest,
    Schedule,
    Tags,
    FirstRun,
    LastRun,
    NextRun,
    RemainingRuns,
    FailureThreshold,
    ConsecutiveFailures,
    Enabled,
    CallCount,
    CallExitStates,
    CreatedAt,
    UpdatedAt,
}

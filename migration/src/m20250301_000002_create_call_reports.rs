use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CallReports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CallReports::TaskId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CallReports::CallRequestId).uuid().not_null())
                    .col(ColumnDef::new(CallReports::GroupId).uuid())
                    .col(ColumnDef::new(CallReports::TaskType).string().not_null())
                    .col(ColumnDef::new(CallReports::State).string().not_null())
                    .col(ColumnDef::new(CallReports::Response).string().not_null())
                    .col(ColumnDef::new(CallReports::Result).json())
                    .col(ColumnDef::new(CallReports::Error).text())
                    .col(ColumnDef::new(CallReports::BlockingTasks).json().not_null())
                    .col(ColumnDef::new(CallReports::Reasons).json().not_null())
                    .col(ColumnDef::new(CallReports::Tags).json().not_null())
                    .col(
                        ColumnDef::new(CallReports::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(CallReports::StartTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(CallReports::FinishTime).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_call_reports_group_id")
                    .table(CallReports::Table)
                    .col(CallReports::GroupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_call_reports_state")
                    .table(CallReports::Table)
                    .col(CallReports::State)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CallReports::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CallReports {
    Table,
    TaskId,
    CallRequestId,
    GroupId,
    TaskType,
    State,
    Response,
    Result,
    Error,
    BlockingTasks,
    Reasons,
    Tags,
    CreatedAt,
    StartTime,
    FinishTime,
}

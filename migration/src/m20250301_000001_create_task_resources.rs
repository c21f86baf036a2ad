use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 task_resources 表
        manager
            .create_table(
                Table::create()
                    .table(TaskResources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskResources::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskResources::TaskId).uuid().not_null())
                    .col(ColumnDef::new(TaskResources::ResourceType).string().not_null())
                    .col(ColumnDef::new(TaskResources::ResourceId).string().not_null())
                    .col(ColumnDef::new(TaskResources::Operation).string().not_null())
                    .col(
                        ColumnDef::new(TaskResources::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 冲突查询按 (resource_type, resource_id) 进行
        manager
            .create_index(
                Index::create()
                    .name("idx_task_resources_resource")
                    .table(TaskResources::Table)
                    .col(TaskResources::ResourceType)
                    .col(TaskResources::ResourceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_resources_task_id")
                    .table(TaskResources::Table)
                    .col(TaskResources::TaskId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskResources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaskResources {
    Table,
    Id,
    TaskId,
    ResourceType,
    ResourceId,
    Operation,
    CreatedAt,
}

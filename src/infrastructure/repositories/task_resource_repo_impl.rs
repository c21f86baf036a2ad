// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::resource::{ConflictReport, ResourceRequirement, TaskResource};
use crate::domain::repositories::task_resource_repository::{
    ConflictEvaluator, RepositoryError, TaskResourceRepository,
};
use crate::infrastructure::database::entities::task_resource as task_resource_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, IsolationLevel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// 资源占用仓库实现
///
/// 基于SeaORM实现，冲突复查与写入在同一个可串行化事务内完成
#[derive(Clone)]
pub struct TaskResourceRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl TaskResourceRepositoryImpl {
    /// 创建新的资源占用仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    ///
    /// # 返回值
    ///
    /// 返回新的资源占用仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<task_resource_entity::Model> for TaskResource {
    type Error = RepositoryError;

    fn try_from(model: task_resource_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            task_id: model.task_id,
            resource_type: model.resource_type,
            resource_id: model.resource_id,
            operation: model
                .operation
                .parse()
                .map_err(RepositoryError::Serialization)?,
            created_at: model.created_at.with_timezone(&Utc),
        })
    }
}

impl From<&TaskResource> for task_resource_entity::ActiveModel {
    fn from(resource: &TaskResource) -> Self {
        Self {
            id: Set(resource.id),
            task_id: Set(resource.task_id),
            resource_type: Set(resource.resource_type.clone()),
            resource_id: Set(resource.resource_id.clone()),
            operation: Set(resource.operation.to_string()),
            created_at: Set(resource.created_at.into()),
        }
    }
}

/// 构造 "(type = ? AND id = ?) OR ..." 条件，相同资源只出现一次
fn matching_condition(requirements: &[ResourceRequirement]) -> Condition {
    let mut seen = HashSet::new();
    requirements
        .iter()
        .filter(|r| seen.insert((r.resource_type.as_str(), r.resource_id.as_str())))
        .fold(Condition::any(), |condition, requirement| {
            condition.add(
                Condition::all()
                    .add(task_resource_entity::Column::ResourceType.eq(requirement.resource_type.clone()))
                    .add(task_resource_entity::Column::ResourceId.eq(requirement.resource_id.clone())),
            )
        })
}

fn into_domain(
    models: Vec<task_resource_entity::Model>,
) -> Result<Vec<TaskResource>, RepositoryError> {
    models.into_iter().map(TaskResource::try_from).collect()
}

#[async_trait]
impl TaskResourceRepository for TaskResourceRepositoryImpl {
    async fn reserve(
        &self,
        task_id: Uuid,
        requirements: &[ResourceRequirement],
        evaluate: ConflictEvaluator<'_>,
    ) -> Result<ConflictReport, RepositoryError> {
        if requirements.is_empty() {
            return Ok(evaluate(&[]));
        }

        let txn = self
            .db
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?;

        let in_flight = task_resource_entity::Entity::find()
            .filter(matching_condition(requirements))
            .order_by_asc(task_resource_entity::Column::CreatedAt)
            .all(&txn)
            .await?;
        let report = evaluate(&into_domain(in_flight)?);

        if !report.is_accepted() {
            txn.rollback().await?;
            return Ok(report);
        }

        let rows: Vec<task_resource_entity::ActiveModel> = requirements
            .iter()
            .map(|requirement| (&TaskResource::for_task(task_id, requirement)).into())
            .collect();
        task_resource_entity::Entity::insert_many(rows)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(report)
    }

    async fn find_matching(
        &self,
        requirements: &[ResourceRequirement],
    ) -> Result<Vec<TaskResource>, RepositoryError> {
        if requirements.is_empty() {
            return Ok(Vec::new());
        }

        let models = task_resource_entity::Entity::find()
            .filter(matching_condition(requirements))
            .order_by_asc(task_resource_entity::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        into_domain(models)
    }

    async fn find_by_task(&self, task_id: Uuid) -> Result<Vec<TaskResource>, RepositoryError> {
        let models = task_resource_entity::Entity::find()
            .filter(task_resource_entity::Column::TaskId.eq(task_id))
            .all(self.db.as_ref())
            .await?;
        into_domain(models)
    }

    async fn delete_by_task(&self, task_id: Uuid) -> Result<u64, RepositoryError> {
        let result = task_resource_entity::Entity::delete_many()
            .filter(task_resource_entity::Column::TaskId.eq(task_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

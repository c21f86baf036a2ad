// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::call::CallState;
use crate::domain::models::scheduled_call::{ScheduleChanges, ScheduledCall};
use crate::domain::repositories::scheduled_call_repository::ScheduledCallRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::scheduled_call as scheduled_call_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 定时调用仓库实现
///
/// 计数器使用 `SET col = col + 1` 形式的单条语句修改
#[derive(Clone)]
pub struct ScheduledCallRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl ScheduledCallRepositoryImpl {
    /// 创建新的定时调用仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    ///
    /// # 返回值
    ///
    /// 返回新的定时调用仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn serialization(e: serde_json::Error) -> RepositoryError {
    RepositoryError::Serialization(e.to_string())
}

fn fixed(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.into()
}

impl TryFrom<scheduled_call_entity::Model> for ScheduledCall {
    type Error = RepositoryError;

    fn try_from(model: scheduled_call_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            serialized_call_request: model.serialized_call_request,
            schedule: model.schedule,
            tags: serde_json::from_value(model.tags).map_err(serialization)?,
            first_run: model.first_run.with_timezone(&Utc),
            last_run: model.last_run.map(|t| t.with_timezone(&Utc)),
            next_run: model.next_run.map(|t| t.with_timezone(&Utc)),
            remaining_runs: model.remaining_runs,
            failure_threshold: model.failure_threshold,
            consecutive_failures: model.consecutive_failures,
            enabled: model.enabled,
            call_count: model.call_count,
            call_exit_states: serde_json::from_value(model.call_exit_states)
                .map_err(serialization)?,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

impl TryFrom<&ScheduledCall> for scheduled_call_entity::ActiveModel {
    type Error = RepositoryError;

    fn try_from(call: &ScheduledCall) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Set(call.id),
            serialized_call_request: Set(call.serialized_call_request.clone()),
            schedule: Set(call.schedule.clone()),
            tags: Set(serde_json::to_value(&call.tags).map_err(serialization)?),
            first_run: Set(fixed(call.first_run)),
            last_run: Set(call.last_run.map(fixed)),
            next_run: Set(call.next_run.map(fixed)),
            remaining_runs: Set(call.remaining_runs),
            failure_threshold: Set(call.failure_threshold),
            consecutive_failures: Set(call.consecutive_failures),
            enabled: Set(call.enabled),
            call_count: Set(call.call_count),
            call_exit_states: Set(
                serde_json::to_value(&call.call_exit_states).map_err(serialization)?,
            ),
            created_at: Set(fixed(call.created_at)),
            updated_at: Set(fixed(call.updated_at)),
        })
    }
}

fn into_domain(
    models: Vec<scheduled_call_entity::Model>,
) -> Result<Vec<ScheduledCall>, RepositoryError> {
    models.into_iter().map(ScheduledCall::try_from).collect()
}

#[async_trait]
impl ScheduledCallRepository for ScheduledCallRepositoryImpl {
    async fn create(&self, call: &ScheduledCall) -> Result<ScheduledCall, RepositoryError> {
        let model = scheduled_call_entity::ActiveModel::try_from(call)?;
        model.insert(self.db.as_ref()).await?;
        Ok(call.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledCall>, RepositoryError> {
        scheduled_call_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(ScheduledCall::try_from)
            .transpose()
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledCall>, RepositoryError> {
        let models = scheduled_call_entity::Entity::find()
            .filter(scheduled_call_entity::Column::Enabled.eq(true))
            .filter(scheduled_call_entity::Column::NextRun.is_not_null())
            .filter(scheduled_call_entity::Column::NextRun.lte(fixed(now)))
            .order_by_asc(scheduled_call_entity::Column::NextRun)
            .all(self.db.as_ref())
            .await?;
        into_domain(models)
    }

    async fn find_all(&self) -> Result<Vec<ScheduledCall>, RepositoryError> {
        let models = scheduled_call_entity::Entity::find()
            .order_by_asc(scheduled_call_entity::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        into_domain(models)
    }

    async fn apply_changes(
        &self,
        id: Uuid,
        changes: &ScheduleChanges,
    ) -> Result<ScheduledCall, RepositoryError> {
        let mut update = scheduled_call_entity::Entity::update_many()
            .col_expr(
                scheduled_call_entity::Column::UpdatedAt,
                Expr::value(fixed(Utc::now())),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id));

        if let Some(serialized) = &changes.serialized_call_request {
            update = update.col_expr(
                scheduled_call_entity::Column::SerializedCallRequest,
                Expr::value(serialized.clone()),
            );
        }
        if let Some(tags) = &changes.tags {
            update = update.col_expr(
                scheduled_call_entity::Column::Tags,
                Expr::value(serde_json::to_value(tags).map_err(serialization)?),
            );
        }
        if let Some(reschedule) = &changes.reschedule {
            update = update
                .col_expr(
                    scheduled_call_entity::Column::Schedule,
                    Expr::value(reschedule.schedule.clone()),
                )
                .col_expr(
                    scheduled_call_entity::Column::FirstRun,
                    Expr::value(fixed(reschedule.first_run)),
                )
                .col_expr(
                    scheduled_call_entity::Column::NextRun,
                    Expr::value::<Option<DateTime<FixedOffset>>>(Some(fixed(
                        reschedule.first_run,
                    ))),
                );
        }
        if let Some(remaining) = changes.remaining_runs {
            update = update.col_expr(
                scheduled_call_entity::Column::RemainingRuns,
                Expr::value(remaining),
            );
        }
        if let Some(threshold) = changes.failure_threshold {
            update = update.col_expr(
                scheduled_call_entity::Column::FailureThreshold,
                Expr::value(threshold),
            );
        }
        if let Some(enabled) = changes.enabled {
            update = update.col_expr(scheduled_call_entity::Column::Enabled, Expr::value(enabled));
        }

        let result = update.exec(self.db.as_ref()).await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = scheduled_call_entity::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<bool, RepositoryError> {
        let result = scheduled_call_entity::Entity::update_many()
            .col_expr(scheduled_call_entity::Column::Enabled, Expr::value(enabled))
            .col_expr(
                scheduled_call_entity::Column::UpdatedAt,
                Expr::value(fixed(Utc::now())),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn advance_next_run(
        &self,
        id: Uuid,
        next_run: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        scheduled_call_entity::Entity::update_many()
            .col_expr(
                scheduled_call_entity::Column::NextRun,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some(fixed(next_run))),
            )
            .col_expr(
                scheduled_call_entity::Column::UpdatedAt,
                Expr::value(fixed(Utc::now())),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn mark_dispatched(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
        call_count: i32,
    ) -> Result<bool, RepositoryError> {
        let result = scheduled_call_entity::Entity::update_many()
            .col_expr(
                scheduled_call_entity::Column::LastRun,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some(fixed(last_run))),
            )
            .col_expr(
                scheduled_call_entity::Column::NextRun,
                Expr::value::<Option<DateTime<FixedOffset>>>(next_run.map(fixed)),
            )
            .col_expr(scheduled_call_entity::Column::CallCount, Expr::value(call_count))
            .col_expr(
                scheduled_call_entity::Column::CallExitStates,
                Expr::value(serde_json::json!([])),
            )
            .col_expr(
                scheduled_call_entity::Column::UpdatedAt,
                Expr::value(fixed(Utc::now())),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .filter(scheduled_call_entity::Column::CallCount.lte(0))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn record_exit_state(
        &self,
        id: Uuid,
        run: DateTime<Utc>,
        state: CallState,
    ) -> Result<Option<ScheduledCall>, RepositoryError> {
        let txn = self.db.begin().await?;

        let model = scheduled_call_entity::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await?;

        let model = match model {
            Some(model)
                if model.call_count > 0
                    && model.last_run.map(|t| t.with_timezone(&Utc)) == Some(run) =>
            {
                model
            }
            _ => {
                txn.commit().await?;
                return Ok(None);
            }
        };

        let mut states: Vec<CallState> =
            serde_json::from_value(model.call_exit_states.clone()).map_err(serialization)?;
        states.push(state);
        let remaining = model.call_count - 1;

        let mut active: scheduled_call_entity::ActiveModel = model.into();
        active.call_count = Set(remaining);
        active.call_exit_states = Set(serde_json::to_value(&states).map_err(serialization)?);
        active.updated_at = Set(fixed(Utc::now()));
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        ScheduledCall::try_from(updated).map(Some)
    }

    async fn reset_call_count(&self, id: Uuid) -> Result<(), RepositoryError> {
        scheduled_call_entity::Entity::update_many()
            .col_expr(scheduled_call_entity::Column::CallCount, Expr::value(0))
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn increment_failures(&self, id: Uuid) -> Result<(), RepositoryError> {
        scheduled_call_entity::Entity::update_many()
            .col_expr(
                scheduled_call_entity::Column::ConsecutiveFailures,
                Expr::col(scheduled_call_entity::Column::ConsecutiveFailures).add(1),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn reset_failures(&self, id: Uuid) -> Result<(), RepositoryError> {
        scheduled_call_entity::Entity::update_many()
            .col_expr(
                scheduled_call_entity::Column::ConsecutiveFailures,
                Expr::value(0),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn disable_if_threshold_reached(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = scheduled_call_entity::Entity::update_many()
            .col_expr(scheduled_call_entity::Column::Enabled, Expr::value(false))
            .col_expr(
                scheduled_call_entity::Column::UpdatedAt,
                Expr::value(fixed(Utc::now())),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .filter(scheduled_call_entity::Column::Enabled.eq(true))
            .filter(scheduled_call_entity::Column::FailureThreshold.is_not_null())
            .filter(
                Expr::col(scheduled_call_entity::Column::ConsecutiveFailures)
                    .gte(Expr::col(scheduled_call_entity::Column::FailureThreshold)),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn decrement_remaining_runs(&self, id: Uuid) -> Result<Option<i32>, RepositoryError> {
        scheduled_call_entity::Entity::update_many()
            .col_expr(
                scheduled_call_entity::Column::RemainingRuns,
                Expr::col(scheduled_call_entity::Column::RemainingRuns).sub(1),
            )
            .filter(scheduled_call_entity::Column::Id.eq(id))
            .filter(scheduled_call_entity::Column::RemainingRuns.gt(0))
            .exec(self.db.as_ref())
            .await?;

        let remaining = scheduled_call_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .and_then(|model| model.remaining_runs);
        Ok(remaining)
    }
}

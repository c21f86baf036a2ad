// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::call::{CallReport, CallState};
use crate::domain::models::resource::CallResponse;
use crate::domain::repositories::call_report_repository::CallReportRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::call_report as call_report_entity;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 调用报告仓库实现
#[derive(Clone)]
pub struct CallReportRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl CallReportRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, RepositoryError> {
    serde_json::from_value(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

impl TryFrom<call_report_entity::Model> for CallReport {
    type Error = RepositoryError;

    fn try_from(model: call_report_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            task_id: model.task_id,
            call_request_id: model.call_request_id,
            group_id: model.group_id,
            task_type: model.task_type,
            state: model.state.parse().map_err(RepositoryError::Serialization)?,
            response: model
                .response
                .parse()
                .map_err(RepositoryError::Serialization)?,
            result: model.result,
            error: model.error,
            blocking_tasks: from_json(model.blocking_tasks)?,
            reasons: from_json(model.reasons)?,
            tags: from_json(model.tags)?,
            created_at: model.created_at.with_timezone(&Utc),
            start_time: model.start_time.map(|t| t.with_timezone(&Utc)),
            finish_time: model.finish_time.map(|t| t.with_timezone(&Utc)),
        })
    }
}

impl TryFrom<&CallReport> for call_report_entity::ActiveModel {
    type Error = RepositoryError;

    fn try_from(report: &CallReport) -> Result<Self, Self::Error> {
        Ok(Self {
            task_id: Set(report.task_id),
            call_request_id: Set(report.call_request_id),
            group_id: Set(report.group_id),
            task_type: Set(report.task_type.clone()),
            state: Set(report.state.to_string()),
            response: Set(report.response.to_string()),
            result: Set(report.result.clone()),
            error: Set(report.error.clone()),
            blocking_tasks: Set(to_json(&report.blocking_tasks)?),
            reasons: Set(to_json(&report.reasons)?),
            tags: Set(to_json(&report.tags)?),
            created_at: Set(report.created_at.into()),
            start_time: Set(report.start_time.map(Into::into)),
            finish_time: Set(report.finish_time.map(Into::into)),
        })
    }
}

#[async_trait]
impl CallReportRepository for CallReportRepositoryImpl {
    async fn create(&self, report: &CallReport) -> Result<CallReport, RepositoryError> {
        let model = call_report_entity::ActiveModel::try_from(report)?;
        model.insert(self.db.as_ref()).await?;
        Ok(report.clone())
    }

    async fn find_by_id(&self, task_id: Uuid) -> Result<Option<CallReport>, RepositoryError> {
        call_report_entity::Entity::find_by_id(task_id)
            .one(self.db.as_ref())
            .await?
            .map(CallReport::try_from)
            .transpose()
    }

    async fn find_by_group(&self, group_id: Uuid) -> Result<Vec<CallReport>, RepositoryError> {
        call_report_entity::Entity::find()
            .filter(call_report_entity::Column::GroupId.eq(group_id))
            .order_by_asc(call_report_entity::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(CallReport::try_from)
            .collect()
    }

    async fn mark_running(
        &self,
        task_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        call_report_entity::Entity::update_many()
            .col_expr(
                call_report_entity::Column::State,
                Expr::value(CallState::Running.to_string()),
            )
            .col_expr(
                call_report_entity::Column::StartTime,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some(started_at.into())),
            )
            .filter(call_report_entity::Column::TaskId.eq(task_id))
            .filter(call_report_entity::Column::State.eq(CallState::Waiting.to_string()))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        task_id: Uuid,
        state: CallState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<CallReport, RepositoryError> {
        call_report_entity::Entity::update_many()
            .col_expr(call_report_entity::Column::State, Expr::value(state.to_string()))
            .col_expr(call_report_entity::Column::Result, Expr::value(result))
            .col_expr(call_report_entity::Column::Error, Expr::value(error))
            .col_expr(
                call_report_entity::Column::FinishTime,
                Expr::value::<Option<DateTime<FixedOffset>>>(Some(Utc::now().into())),
            )
            .filter(call_report_entity::Column::TaskId.eq(task_id))
            .exec(self.db.as_ref())
            .await?;

        self.find_by_id(task_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let cutoff: DateTime<FixedOffset> = cutoff.into();
        let result = call_report_entity::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(call_report_entity::Column::FinishTime.lt(cutoff))
                    .add(
                        Condition::all()
                            .add(
                                call_report_entity::Column::Response
                                    .eq(CallResponse::Postponed.to_string()),
                            )
                            .add(
                                call_report_entity::Column::State
                                    .eq(CallState::Waiting.to_string()),
                            )
                            .add(call_report_entity::Column::CreatedAt.lt(cutoff)),
                    ),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

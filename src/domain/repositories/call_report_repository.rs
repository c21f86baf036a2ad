// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::call::{CallReport, CallState};
use crate::domain::repositories::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 调用报告仓库特质
#[async_trait]
pub trait CallReportRepository: Send + Sync {
    /// 保存新的调用报告
    async fn create(&self, report: &CallReport) -> Result<CallReport, RepositoryError>;
    /// 根据任务ID查找报告
    async fn find_by_id(&self, task_id: Uuid) -> Result<Option<CallReport>, RepositoryError>;
    /// 查找同一行程组的报告，按创建时间排序
    async fn find_by_group(&self, group_id: Uuid) -> Result<Vec<CallReport>, RepositoryError>;
    /// 标记为运行中
    async fn mark_running(
        &self,
        task_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// 写入终止状态，返回更新后的报告
    async fn finish(
        &self,
        task_id: Uuid,
        state: CallState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<CallReport, RepositoryError>;
    /// 删除 `cutoff` 之前结束的报告，以及 `cutoff` 之前创建且仍在等待的推迟报告
    ///
    /// 返回删除的数量
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

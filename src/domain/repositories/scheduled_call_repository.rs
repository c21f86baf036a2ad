// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::call::CallState;
use crate::domain::models::scheduled_call::{ScheduleChanges, ScheduledCall};
use crate::domain::repositories::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 定时调用仓库特质
///
/// 计数器的修改都以单条语句或单个加锁事务完成，不在内存中读改写
#[async_trait]
pub trait ScheduledCallRepository: Send + Sync {
    /// 保存新的定时调用
    async fn create(&self, call: &ScheduledCall) -> Result<ScheduledCall, RepositoryError>;
    /// 根据ID查找
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScheduledCall>, RepositoryError>;
    /// 查找已启用且 `next_run <= now` 的定时调用
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledCall>, RepositoryError>;
    /// 查找全部定时调用
    async fn find_all(&self) -> Result<Vec<ScheduledCall>, RepositoryError>;
    /// 以单条语句只写入变更中给出的定义字段，返回更新后的记录
    ///
    /// 计数器列、`last_run` 以及未给出的列保持存储中的当前值
    async fn apply_changes(
        &self,
        id: Uuid,
        changes: &ScheduleChanges,
    ) -> Result<ScheduledCall, RepositoryError>;
    /// 删除，返回是否存在
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
    /// 启用或禁用，返回是否存在
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<bool, RepositoryError>;
    /// 只推进下一次运行时间
    async fn advance_next_run(
        &self,
        id: Uuid,
        next_run: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// 记录一次触发
    ///
    /// 一条语句写入 `last_run`、`next_run`、`call_count` 并清空退出状态，
    /// 仅当没有未结束的调用时生效；返回是否生效。
    /// `next_run` 为 None 表示这是最后一次运行
    async fn mark_dispatched(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
        call_count: i32,
    ) -> Result<bool, RepositoryError>;
    /// 追加一个调用的终止状态并将 `call_count` 减一
    ///
    /// `run` 是该调用所属运行组的触发时间，与记录的 `last_run` 不一致时不做修改。
    /// 返回更新后的记录；记录不存在、运行组已更换或已没有未结束的调用时返回 None
    async fn record_exit_state(
        &self,
        id: Uuid,
        run: DateTime<Utc>,
        state: CallState,
    ) -> Result<Option<ScheduledCall>, RepositoryError>;
    /// 放弃当前运行组，将 `call_count` 清零
    async fn reset_call_count(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// 连续失败次数加一
    async fn increment_failures(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// 连续失败次数清零
    async fn reset_failures(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// 连续失败次数达到阈值时禁用，返回是否因此被禁用
    async fn disable_if_threshold_reached(&self, id: Uuid) -> Result<bool, RepositoryError>;
    /// 剩余运行次数减一（为空时不变），返回更新后的值
    async fn decrement_remaining_runs(&self, id: Uuid) -> Result<Option<i32>, RepositoryError>;
}

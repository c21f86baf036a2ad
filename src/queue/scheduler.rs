// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::SchedulerSettings;
use crate::domain::models::call::{CallReport, CallState, Itinerary};
use crate::domain::models::resource::CallResponse;
use crate::domain::models::scheduled_call::{
    stored_count, Reschedule, ScheduleChanges, ScheduleOptions, ScheduleReport, ScheduleUpdate,
    ScheduledCall,
};
use crate::domain::repositories::scheduled_call_repository::ScheduledCallRepository;
use crate::domain::services::coordinator::{CompletionHook, Coordinator};
use crate::domain::services::recurrence::{calculate_first_run, calculate_next_run};
use crate::infrastructure::metrics::{
    SCHEDULES_DISABLED_TOTAL, SCHEDULE_FIRES_TOTAL, SCHEDULE_SKIPS_TOTAL,
};
use crate::utils::errors::ServiceError;
use crate::workers::dispatch_worker::DispatchWorker;
use crate::workers::Worker;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 时间来源，测试中可替换为固定时间
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 一次调度周期的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// 已触发的定时调用数
    pub fired: usize,
    /// 因上一次调用尚未结束而跳过的数量
    pub skipped: usize,
    /// 因不再运行而删除的数量
    pub deleted: usize,
}

/// 定时调用调度器
///
/// 持久化定时调用，并在到期时通过协调器提交其行程。
/// 所有计数都保存在存储中，调度器本身只持有调度循环的句柄
pub struct Scheduler {
    repository: Arc<dyn ScheduledCallRepository>,
    coordinator: Arc<Coordinator>,
    bookkeeper: RunBookkeeper,
    settings: SchedulerSettings,
    clock: Clock,
    loop_handle: Mutex<Option<(JoinHandle<()>, Arc<Notify>)>>,
}

impl Scheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    ///
    /// * `repository` - 定时调用仓库
    /// * `coordinator` - 用于提交到期调用的协调器
    /// * `settings` - 调度器配置
    ///
    /// # 返回值
    ///
    /// 返回新的调度器实例
    pub fn new(
        repository: Arc<dyn ScheduledCallRepository>,
        coordinator: Arc<Coordinator>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            bookkeeper: RunBookkeeper {
                repository: repository.clone(),
            },
            repository,
            coordinator,
            settings,
            clock: Arc::new(Utc::now),
            loop_handle: Mutex::new(None),
        }
    }

    /// 替换时间来源
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// 添加定时调用
    ///
    /// # 参数
    ///
    /// * `itinerary` - 每次触发时提交的调用或调用列表
    /// * `schedule` - ISO8601 重复时间间隔，如 `R5/2025-01-01T00:00:00Z/PT1H`
    /// * `options` - 创建选项
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(id))` - 新定时调用的ID
    /// * `Ok(None)` - 该调度永远不会运行，未保存任何内容
    /// * `Err(ServiceError::InvalidValue)` - 调度表达式或选项不合法
    pub async fn add(
        &self,
        itinerary: impl Into<Itinerary>,
        schedule: &str,
        options: ScheduleOptions,
    ) -> Result<Option<Uuid>, ServiceError> {
        options.validate()?;
        let itinerary = itinerary.into();
        if itinerary.is_empty() {
            return Err(ServiceError::invalid_value(
                "call_request",
                "must contain at least one call",
            ));
        }

        let first = match calculate_first_run(schedule, self.now())
            .map_err(|e| ServiceError::invalid_value("schedule", e.to_string()))?
        {
            Some(first) => first,
            None => {
                info!("Schedule {} never runs, nothing added", schedule);
                return Ok(None);
            }
        };

        let call = ScheduledCall::new(
            &itinerary,
            schedule,
            first.first_run,
            stored_count("schedule", first.run_count)?,
            &options,
        )?;
        let created = self.repository.create(&call).await?;
        info!(
            "Added schedule {} ({}), first run at {}",
            created.id, schedule, created.first_run
        );
        Ok(Some(created.id))
    }

    /// 添加定时调用，选项来自未类型化的映射
    pub async fn add_with_raw_options(
        &self,
        itinerary: impl Into<Itinerary>,
        schedule: &str,
        options: &Map<String, Value>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let options = ScheduleOptions::try_from(options)?;
        self.add(itinerary, schedule, options).await
    }

    /// 更新定时调用
    ///
    /// 全部字段校验通过后才会写入，且只写入给出的字段；
    /// 新的调度表达式会重新计算首次运行时间和剩余次数
    ///
    /// # 参数
    ///
    /// * `id` - 定时调用ID
    /// * `updates` - 要修改的字段
    ///
    /// # 返回值
    ///
    /// * `Ok(ScheduleReport)` - 更新后的视图
    /// * `Err(ServiceError)` - 不存在、字段不支持或取值不合法
    pub async fn update(
        &self,
        id: Uuid,
        updates: &Map<String, Value>,
    ) -> Result<ScheduleReport, ServiceError> {
        let existing = self.find_existing(id).await?;
        let update = ScheduleUpdate::try_from(updates)?;
        if update.is_empty() {
            return Ok(existing.report());
        }

        let mut changes = ScheduleChanges::default();
        if let Some(itinerary) = &update.call_request {
            changes.serialized_call_request = Some(itinerary.serialize()?);
            let mut tags = existing.tags.clone();
            for tag in itinerary.tags() {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
            if tags != existing.tags {
                changes.tags = Some(tags);
            }
        }
        if let Some(schedule) = &update.schedule {
            let first = calculate_first_run(schedule, self.now())
                .map_err(|e| ServiceError::invalid_value("schedule", e.to_string()))?
                .ok_or_else(|| ServiceError::invalid_value("schedule", "schedule never runs"))?;
            changes.remaining_runs = Some(stored_count("schedule", first.run_count)?);
            changes.reschedule = Some(Reschedule {
                schedule: schedule.clone(),
                first_run: first.first_run,
            });
        }
        if let Some(threshold) = update.failure_threshold {
            changes.failure_threshold = Some(stored_count("failure_threshold", threshold)?);
        }
        if let Some(remaining) = update.remaining_runs {
            changes.remaining_runs = Some(stored_count("remaining_runs", remaining)?);
        }
        changes.enabled = update.enabled;

        let updated = self.repository.apply_changes(id, &changes).await?;
        debug!("Updated schedule {}", id);
        Ok(updated.report())
    }

    /// 删除定时调用
    pub async fn remove(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.repository.delete(id).await? {
            return Err(ServiceError::missing("schedule", id));
        }
        info!("Removed schedule {}", id);
        Ok(())
    }

    /// 启用定时调用，同时清零连续失败次数
    pub async fn enable(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.repository.set_enabled(id, true).await? {
            return Err(ServiceError::missing("schedule", id));
        }
        self.repository.reset_failures(id).await?;
        Ok(())
    }

    pub async fn disable(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.repository.set_enabled(id, false).await? {
            return Err(ServiceError::missing("schedule", id));
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<ScheduleReport, ServiceError> {
        Ok(self.find_existing(id).await?.report())
    }

    /// 查找包含全部给定标签的定时调用
    pub async fn find(&self, tags: &[String]) -> Result<Vec<ScheduleReport>, ServiceError> {
        let calls = self.repository.find_all().await?;
        Ok(calls
            .iter()
            .filter(|call| tags.iter().all(|tag| call.tags.contains(tag)))
            .map(ScheduledCall::report)
            .collect())
    }

    /// 启动调度循环
    pub fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        let mut handle = self.loop_handle.lock();
        if handle.is_some() {
            return Err(ServiceError::InvalidState(
                "scheduler is already running".to_string(),
            ));
        }

        let shutdown = Arc::new(Notify::new());
        let worker = DispatchWorker::new(
            self.clone(),
            self.settings.dispatch_interval(),
            shutdown.clone(),
        );
        let join = tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Worker {} stopped with error: {}", worker.name(), e);
            }
        });

        *handle = Some((join, shutdown));
        info!(
            "Scheduler started, dispatching every {:?}",
            self.settings.dispatch_interval()
        );
        Ok(())
    }

    /// 停止调度循环并等待其退出
    pub async fn stop(&self) -> Result<(), ServiceError> {
        let (join, shutdown) = self
            .loop_handle
            .lock()
            .take()
            .ok_or_else(|| ServiceError::InvalidState("scheduler is not running".to_string()))?;

        shutdown.notify_one();
        if let Err(e) = join.await {
            warn!("Dispatch loop ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle.lock().is_some()
    }

    /// 执行一次调度周期
    ///
    /// # 参数
    ///
    /// * `now` - 判断是否到期的时间
    ///
    /// # 返回值
    ///
    /// * `Ok(DispatchSummary)` - 本次周期的统计
    /// * `Err(ServiceError)` - 查询到期调用失败
    pub async fn run_due_calls(&self, now: DateTime<Utc>) -> Result<DispatchSummary, ServiceError> {
        let due = self.repository.find_due(now).await?;
        let mut summary = DispatchSummary::default();

        for call in due {
            // 单个定时调用出错不影响本周期的其余调用
            if let Err(e) = self.dispatch_one(&call, now, &mut summary).await {
                error!("Failed to dispatch schedule {}: {}", call.id, e);
            }
        }

        if summary != DispatchSummary::default() {
            debug!(
                "Dispatch cycle: fired {}, skipped {}, deleted {}",
                summary.fired, summary.skipped, summary.deleted
            );
        }
        Ok(summary)
    }

    async fn dispatch_one(
        &self,
        call: &ScheduledCall,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) -> Result<(), ServiceError> {
        let Some(scheduled_for) = call.next_run else {
            return Ok(());
        };

        if call.remaining_runs == Some(0) {
            self.repository.delete(call.id).await?;
            info!("Schedule {} has no runs left, deleted", call.id);
            summary.deleted += 1;
            return Ok(());
        }

        let mut advanced = call.clone();
        advanced.last_run = Some(scheduled_for);
        let next_run = calculate_next_run(&advanced, now)
            .map_err(|e| ServiceError::invalid_value("schedule", e.to_string()))?;

        if call.has_outstanding_calls() {
            warn!(
                "Skipping schedule {}: {} call(s) from the previous run still outstanding",
                call.id, call.call_count
            );
            if let Some(next_run) = next_run {
                self.repository.advance_next_run(call.id, next_run).await?;
            }
            counter!(SCHEDULE_SKIPS_TOTAL).increment(1);
            summary.skipped += 1;
            return Ok(());
        }

        let itinerary = call.itinerary()?;
        let call_count = itinerary.len() as i32;
        if !self
            .repository
            .mark_dispatched(call.id, scheduled_for, next_run, call_count)
            .await?
        {
            debug!("Schedule {} was dispatched concurrently, skipping", call.id);
            summary.skipped += 1;
            return Ok(());
        }

        counter!(SCHEDULE_FIRES_TOTAL).increment(1);
        summary.fired += 1;
        info!(
            "Firing schedule {} ({} call(s)), next run {:?}",
            call.id, call_count, next_run
        );

        let hook = self.bookkeeper.hook(call.id, scheduled_for);
        match self
            .coordinator
            .execute_multiple_calls(itinerary.calls, vec![hook])
            .await
        {
            Ok(reports) => {
                for report in reports
                    .iter()
                    .filter(|r| r.response == CallResponse::Postponed)
                {
                    debug!(
                        "Scheduled call {} postponed, counted as canceled",
                        report.task_id
                    );
                    self.bookkeeper
                        .record_call_exit(call.id, scheduled_for, CallState::Canceled)
                        .await;
                }
            }
            Err(e) => {
                // 已提交调用的回调带有本次触发时间，放弃运行组后它们的退出不再计入
                error!("Submitting schedule {} failed: {}", call.id, e);
                self.repository.reset_call_count(call.id).await?;
                self.bookkeeper.finalize_run(call.id, true, next_run).await?;
            }
        }
        Ok(())
    }

    async fn find_existing(&self, id: Uuid) -> Result<ScheduledCall, ServiceError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::missing("schedule", id))
    }
}

/// 运行组结束时的计数维护
#[derive(Clone)]
struct RunBookkeeper {
    repository: Arc<dyn ScheduledCallRepository>,
}

impl RunBookkeeper {
    /// 生成记录 `run` 这次触发的调用退出状态的回调
    fn hook(&self, schedule_id: Uuid, run: DateTime<Utc>) -> CompletionHook {
        let bookkeeper = self.clone();
        Arc::new(move |report: CallReport| {
            let bookkeeper = bookkeeper.clone();
            async move {
                bookkeeper.record_call_exit(schedule_id, run, report.state).await;
            }
            .boxed()
        })
    }

    /// 记录一个调用的终止状态，最后一个调用结束时完成本次运行
    async fn record_call_exit(&self, schedule_id: Uuid, run: DateTime<Utc>, state: CallState) {
        let updated = match self
            .repository
            .record_exit_state(schedule_id, run, state)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                debug!(
                    "Ignoring exit of a call from run {} of schedule {}",
                    run, schedule_id
                );
                return;
            }
            Err(e) => {
                error!(
                    "Failed to record exit state for schedule {}: {}",
                    schedule_id, e
                );
                return;
            }
        };

        if updated.has_outstanding_calls() {
            return;
        }

        let failed = updated.call_exit_states.iter().any(CallState::is_error);
        if let Err(e) = self.finalize_run(schedule_id, failed, updated.next_run).await {
            error!("Failed to finalize run of schedule {}: {}", schedule_id, e);
        }
    }

    async fn finalize_run(
        &self,
        schedule_id: Uuid,
        failed: bool,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<(), ServiceError> {
        if failed {
            self.repository.increment_failures(schedule_id).await?;
            if self
                .repository
                .disable_if_threshold_reached(schedule_id)
                .await?
            {
                warn!(
                    "Schedule {} disabled after reaching its failure threshold",
                    schedule_id
                );
                counter!(SCHEDULES_DISABLED_TOTAL).increment(1);
            }
        } else {
            self.repository.reset_failures(schedule_id).await?;
        }

        let remaining = self.repository.decrement_remaining_runs(schedule_id).await?;
        if remaining == Some(0) || next_run.is_none() {
            self.repository.delete(schedule_id).await?;
            info!("Schedule {} completed its last run, deleted", schedule_id);
        }
        Ok(())
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::CoordinatorSettings;
use crate::domain::models::call::{CallReport, CallRequest, CallState};
use crate::domain::models::resource::{
    CallResponse, ConflictReport, ResourceRequirement, TaskResource,
};
use crate::domain::repositories::call_report_repository::CallReportRepository;
use crate::domain::repositories::task_resource_repository::TaskResourceRepository;
use crate::domain::repositories::RepositoryError;
use crate::domain::services::conflict_matrix::evaluate_conflicts;
use crate::infrastructure::metrics::{
    CALLS_COMPLETED_TOTAL, CALLS_TOTAL, RESERVATION_RELEASE_FAILURES_TOTAL,
};
use crate::queue::task_queue::{WorkListener, WorkOutcome, WorkUnit, WorkerPool};
use crate::utils::errors::ServiceError;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 调用结束后执行的回调
///
/// 每个调用恰好执行一次，参数为终止状态的调用报告
pub type CompletionHook = Arc<dyn Fn(CallReport) -> BoxFuture<'static, ()> + Send + Sync>;

/// 任务协调器
///
/// 判定新请求能否与进行中的任务并发执行，接受时保留资源并交给工作池，
/// 任务结束时释放资源并记录结果
pub struct Coordinator {
    resources: Arc<dyn TaskResourceRepository>,
    reports: Arc<dyn CallReportRepository>,
    pool: Arc<dyn WorkerPool>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    /// 创建新的协调器
    ///
    /// # 参数
    ///
    /// * `resources` - 资源占用仓库
    /// * `reports` - 调用报告仓库
    /// * `pool` - 工作池
    /// * `settings` - 协调器配置
    ///
    /// # 返回值
    ///
    /// 返回新的协调器实例
    pub fn new(
        resources: Arc<dyn TaskResourceRepository>,
        reports: Arc<dyn CallReportRepository>,
        pool: Arc<dyn WorkerPool>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            resources,
            reports,
            pool,
            settings,
        }
    }

    /// 检查一组资源需求与进行中任务的冲突，不做任何修改
    ///
    /// # 参数
    ///
    /// * `requirements` - 资源需求
    ///
    /// # 返回值
    ///
    /// * `Ok(ConflictReport)` - 判定结果
    /// * `Err(ServiceError)` - 查询失败
    pub async fn find_conflicts(
        &self,
        requirements: &[ResourceRequirement],
    ) -> Result<ConflictReport, ServiceError> {
        let in_flight = self.resources.find_matching(requirements).await?;
        Ok(evaluate_conflicts(requirements, &in_flight))
    }

    /// 异步提交一个调用
    pub async fn execute_call(&self, request: CallRequest) -> Result<CallReport, ServiceError> {
        self.dispatch(request, None, Vec::new()).await
    }

    /// 异步提交一个调用，并在结束时执行回调
    ///
    /// 被拒绝的调用也会以终止报告执行一次回调；被推迟的调用不会
    pub async fn execute_call_with_hooks(
        &self,
        request: CallRequest,
        hooks: Vec<CompletionHook>,
    ) -> Result<CallReport, ServiceError> {
        self.dispatch(request, None, hooks).await
    }

    /// 提交一个调用并等待其结束
    ///
    /// 只有被接受的调用会等待；拒绝和推迟的报告立即返回
    ///
    /// # 参数
    ///
    /// * `request` - 调用请求
    /// * `timeout` - 等待超时，缺省使用配置中的默认值
    ///
    /// # 返回值
    ///
    /// * `Ok(CallReport)` - 调用报告
    /// * `Err(ServiceError::OperationTimedOut)` - 超时，任务仍在运行
    pub async fn execute_call_synchronously(
        &self,
        request: CallRequest,
        timeout: Option<Duration>,
    ) -> Result<CallReport, ServiceError> {
        let report = self.dispatch(request, None, Vec::new()).await?;
        if report.response != CallResponse::Accepted || report.is_terminal() {
            return Ok(report);
        }

        let timeout = timeout.unwrap_or_else(|| self.settings.default_wait_timeout());
        self.wait_for_task(report.task_id, timeout).await
    }

    /// 按声明顺序提交多个调用，共享同一个新的行程组ID
    pub async fn execute_multiple_calls(
        &self,
        requests: Vec<CallRequest>,
        hooks: Vec<CompletionHook>,
    ) -> Result<Vec<CallReport>, ServiceError> {
        let group_id = Uuid::new_v4();
        let mut reports = Vec::with_capacity(requests.len());
        for request in requests {
            reports.push(self.dispatch(request, Some(group_id), hooks.clone()).await?);
        }
        Ok(reports)
    }

    /// 轮询调用报告直到终止状态
    ///
    /// 超时不会取消任务
    pub async fn wait_for_task(
        &self,
        task_id: Uuid,
        timeout: Duration,
    ) -> Result<CallReport, ServiceError> {
        let deadline = Instant::now() + timeout;
        let poll = self.settings.wait_poll_interval();

        loop {
            let report = self
                .reports
                .find_by_id(task_id)
                .await?
                .ok_or_else(|| ServiceError::missing("task", task_id))?;
            if report.is_terminal() {
                return Ok(report);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ServiceError::OperationTimedOut { task_id, timeout });
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    /// 获取调用报告
    pub async fn get_call_report(&self, task_id: Uuid) -> Result<CallReport, ServiceError> {
        self.reports
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| ServiceError::missing("task", task_id))
    }

    /// 获取同一行程组的调用报告
    pub async fn find_call_reports_by_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<CallReport>, ServiceError> {
        Ok(self.reports.find_by_group(group_id).await?)
    }

    /// 查看任务持有的资源
    pub async fn find_task_resources(&self, task_id: Uuid) -> Result<Vec<TaskResource>, ServiceError> {
        Ok(self.resources.find_by_task(task_id).await?)
    }

    /// 释放任务持有的全部资源
    ///
    /// 任务结束时自动调用；也可用于清理异常退出的任务留下的占用
    pub async fn release_reservations(&self, task_id: Uuid) -> Result<u64, ServiceError> {
        Ok(self.resources.delete_by_task(task_id).await?)
    }

    async fn dispatch(
        &self,
        request: CallRequest,
        group_id: Option<Uuid>,
        hooks: Vec<CompletionHook>,
    ) -> Result<CallReport, ServiceError> {
        let task_id = Uuid::new_v4();
        let conflicts = self.reserve(task_id, &request.resources).await?;
        counter!(CALLS_TOTAL, "response" => conflicts.response.to_string()).increment(1);

        let report = CallReport::for_submission(task_id, &request, group_id, &conflicts);

        match conflicts.response {
            CallResponse::Rejected => {
                info!(
                    "Call {} ({}) rejected: {}",
                    task_id,
                    request.task_type,
                    report.error.as_deref().unwrap_or_default()
                );
                self.reports.create(&report).await?;
                counter!(CALLS_COMPLETED_TOTAL, "state" => CallState::Error.to_string())
                    .increment(1);
                run_hooks(&hooks, &report).await;
                Ok(report)
            }
            CallResponse::Postponed => {
                info!(
                    "Call {} ({}) postponed behind {} task(s)",
                    task_id,
                    request.task_type,
                    conflicts.blocking_task_ids.len()
                );
                self.reports.create(&report).await?;
                Ok(report)
            }
            CallResponse::Accepted => {
                if let Err(e) = self.reports.create(&report).await {
                    release(self.resources.as_ref(), task_id).await;
                    return Err(e.into());
                }

                let listener = Arc::new(CompletionListener {
                    resources: self.resources.clone(),
                    reports: self.reports.clone(),
                    submitted: report.clone(),
                    hooks: hooks.clone(),
                });
                let unit = WorkUnit { task_id, request };

                match self.pool.submit(unit, listener).await {
                    Ok(()) => {
                        debug!("Call {} accepted and queued", task_id);
                        Ok(report)
                    }
                    Err(e) => {
                        warn!("Worker pool refused call {}: {}", task_id, e);
                        release(self.resources.as_ref(), task_id).await;
                        let refused = self
                            .reports
                            .finish(
                                task_id,
                                CallState::Error,
                                None,
                                Some(format!("worker pool refused the call: {}", e)),
                            )
                            .await?;
                        counter!(CALLS_COMPLETED_TOTAL, "state" => CallState::Error.to_string())
                            .increment(1);
                        run_hooks(&hooks, &refused).await;
                        Ok(refused)
                    }
                }
            }
        }
    }

    /// 在事务内复查冲突并写入占用，数据库错误时有限次重试
    async fn reserve(
        &self,
        task_id: Uuid,
        requirements: &[ResourceRequirement],
    ) -> Result<ConflictReport, ServiceError> {
        let evaluate = |in_flight: &[TaskResource]| evaluate_conflicts(requirements, in_flight);
        let mut attempt = 0;

        loop {
            match self.resources.reserve(task_id, requirements, &evaluate).await {
                Ok(report) => return Ok(report),
                Err(RepositoryError::Database(e)) if attempt < self.settings.reserve_retries => {
                    attempt += 1;
                    warn!(
                        "Reservation for task {} failed (attempt {}): {}",
                        task_id, attempt, e
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn run_hooks(hooks: &[CompletionHook], report: &CallReport) {
    for hook in hooks {
        hook(report.clone()).await;
    }
}

/// 释放资源，失败时告警但不重试
async fn release(resources: &dyn TaskResourceRepository, task_id: Uuid) {
    match resources.delete_by_task(task_id).await {
        Ok(released) => debug!("Released {} reservation(s) held by task {}", released, task_id),
        Err(e) => {
            error!(
                alert = true,
                task_id = %task_id,
                "Failed to release resource reservations: {}",
                e
            );
            counter!(RESERVATION_RELEASE_FAILURES_TOTAL).increment(1);
        }
    }
}

/// 被接受调用的生命周期监听器
struct CompletionListener {
    resources: Arc<dyn TaskResourceRepository>,
    reports: Arc<dyn CallReportRepository>,
    /// 提交时的报告，报告存储不可用时用来构造终止报告
    submitted: CallReport,
    hooks: Vec<CompletionHook>,
}

#[async_trait]
impl WorkListener for CompletionListener {
    async fn on_start(&self, task_id: Uuid) {
        if let Err(e) = self.reports.mark_running(task_id, Utc::now()).await {
            warn!("Failed to mark task {} as running: {}", task_id, e);
        }
    }

    async fn on_complete(&self, task_id: Uuid, outcome: WorkOutcome) {
        // 先释放占用，后续步骤失败也不会泄漏
        release(self.resources.as_ref(), task_id).await;

        let (state, result, error) = outcome.into_parts();
        counter!(CALLS_COMPLETED_TOTAL, "state" => state.to_string()).increment(1);
        if let Some(message) = &error {
            warn!("Task {} ({}) failed: {}", task_id, self.submitted.task_type, message);
        } else {
            debug!("Task {} ({}) finished", task_id, self.submitted.task_type);
        }

        let report = match self
            .reports
            .finish(task_id, state, result.clone(), error.clone())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                error!("Failed to record completion of task {}: {}", task_id, e);
                let mut report = self.submitted.clone();
                report.state = state;
                report.result = result;
                report.error = error;
                report.finish_time = Some(Utc::now());
                report
            }
        };

        run_hooks(&self.hooks, &report).await;
    }
}

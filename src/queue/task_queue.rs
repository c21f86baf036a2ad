// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::call::{CallRequest, CallState};
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::metrics::CALL_DURATION_SECONDS;
use crate::queue::handler_registry::HandlerRegistry;
use async_trait::async_trait;
use metrics::histogram;
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 没有对应任务类型的处理器
    #[error("No handler registered for task type {0}")]
    UnknownTaskType(String),

    /// 工作池已关闭
    #[error("Worker pool is closed")]
    Closed,
}

/// 交给工作池执行的工作单元
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub task_id: Uuid,
    pub request: CallRequest,
}

/// 工作单元的执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    /// 处理器正常返回
    Succeeded(Value),
    /// 处理器返回错误
    Failed(String),
    /// 处理器发生 panic
    Panicked(String),
}

impl WorkOutcome {
    /// 对应的调用状态
    pub fn state(&self) -> CallState {
        match self {
            WorkOutcome::Succeeded(_) => CallState::Finished,
            WorkOutcome::Failed(_) | WorkOutcome::Panicked(_) => CallState::Error,
        }
    }

    /// 拆分为 (状态, 结果, 错误信息)
    pub fn into_parts(self) -> (CallState, Option<Value>, Option<String>) {
        match self {
            WorkOutcome::Succeeded(value) => (CallState::Finished, Some(value), None),
            WorkOutcome::Failed(error) => (CallState::Error, None, Some(error)),
            WorkOutcome::Panicked(message) => {
                (CallState::Error, None, Some(format!("handler panicked: {}", message)))
            }
        }
    }
}

/// 工作单元生命周期监听器
///
/// `on_complete` 对每个被接收的工作单元恰好调用一次，无论处理器成功、失败还是 panic
#[async_trait]
pub trait WorkListener: Send + Sync {
    /// 开始执行
    async fn on_start(&self, task_id: Uuid);

    /// 执行结束
    async fn on_complete(&self, task_id: Uuid, outcome: WorkOutcome);
}

/// 工作池特质
///
/// 被推迟的调用不会交给工作池；何时重新提交由调用方决定，
/// 工作池和协调器都不会自行重试
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// 提交工作单元
    ///
    /// # 参数
    ///
    /// * `unit` - 工作单元
    /// * `listener` - 生命周期监听器
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 已接收，之后会回调监听器
    /// * `Err(QueueError)` - 拒绝接收，监听器不会被调用
    async fn submit(&self, unit: WorkUnit, listener: Arc<dyn WorkListener>) -> Result<(), QueueError>;
}

/// 基于tokio任务的工作池实现
///
/// 用信号量限制并发，处理器在独立任务中运行以捕获 panic
pub struct TokioWorkerPool {
    registry: HandlerRegistry,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl TokioWorkerPool {
    /// 创建新的工作池
    ///
    /// # 参数
    ///
    /// * `registry` - 处理器注册表
    /// * `concurrency` - 同时运行的工作单元上限
    ///
    /// # 返回值
    ///
    /// 返回新的工作池实例
    pub fn new(registry: HandlerRegistry, concurrency: usize) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            closed: AtomicBool::new(false),
        }
    }

    /// 关闭工作池，之后提交的工作单元会被拒绝
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 当前可用的执行槽位
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl WorkerPool for TokioWorkerPool {
    async fn submit(&self, unit: WorkUnit, listener: Arc<dyn WorkListener>) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let handler = self
            .registry
            .get(&unit.request.task_type)
            .ok_or_else(|| QueueError::UnknownTaskType(unit.request.task_type.clone()))?;
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let WorkUnit { task_id, request } = unit;

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Worker pool closed before task {} could start", task_id);
                    listener
                        .on_complete(task_id, WorkOutcome::Failed("worker pool closed".to_string()))
                        .await;
                    return;
                }
            };

            listener.on_start(task_id).await;
            debug!("Running task {} ({})", task_id, request.task_type);

            let started = Instant::now();
            let run = tokio::spawn(async move { handler.handle(task_id, request.payload).await });
            let outcome = match run.await {
                Ok(Ok(value)) => WorkOutcome::Succeeded(value),
                Ok(Err(e)) => WorkOutcome::Failed(e.to_string()),
                Err(e) if e.is_panic() => WorkOutcome::Panicked(panic_message(e.into_panic())),
                Err(e) => WorkOutcome::Failed(format!("task aborted: {}", e)),
            };
            histogram!(CALL_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

            listener.on_complete(task_id, outcome).await;
        });

        Ok(())
    }
}

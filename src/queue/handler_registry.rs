// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 处理器返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError(message)
    }
}

/// 任务处理器特质
///
/// 按 `task_type` 注册，执行时接收调用请求的负载
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 执行任务
    ///
    /// # 参数
    ///
    /// * `task_id` - 本次执行的任务ID
    /// * `payload` - 调用请求的负载
    ///
    /// # 返回值
    ///
    /// * `Ok(Value)` - 记录到调用报告中的结果
    /// * `Err(HandlerError)` - 执行失败
    async fn handle(&self, task_id: Uuid, payload: Value) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(Uuid, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, task_id: Uuid, payload: Value) -> Result<Value, HandlerError> {
        (self)(task_id, payload).await
    }
}

/// 处理器注册表
///
/// 将任务类型映射到处理器，替代按名称反射调用
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同名处理器会被替换
    pub fn register<H>(&self, task_type: impl Into<String>, handler: H)
    where
        H: TaskHandler + 'static,
    {
        self.handlers.insert(task_type.into(), Arc::new(handler));
    }

    pub fn unregister(&self, task_type: &str) -> bool {
        self.handlers.remove(task_type).is_some()
    }

    /// 查找处理器
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// 已注册的任务类型，按名称排序
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

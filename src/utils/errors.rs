// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::task_resource_repository::RepositoryError;
use crate::queue::task_queue::QueueError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 协调器与调度器对外暴露的错误类型
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 字段值不合法
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// 存在不支持的字段
    #[error("unsupported fields: {}", fields.join(", "))]
    UnsupportedValue { fields: Vec<String> },

    /// 资源不存在
    #[error("{resource_type} {resource_id} does not exist")]
    MissingResource {
        resource_type: String,
        resource_id: String,
    },

    /// 等待任务结束超时，任务本身仍在运行
    #[error("timed out after {timeout:?} waiting for task {task_id}")]
    OperationTimedOut { task_id: Uuid, timeout: Duration },

    /// 当前状态不允许该操作
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ServiceError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(resource_type: impl Into<String>, resource_id: impl ToString) -> Self {
        ServiceError::MissingResource {
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
        }
    }
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("仓库错误: {0}")]
    RepositoryError(String),

    #[error("服务错误: {0}")]
    ServiceError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl From<ServiceError> for WorkerError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Repository(e) => WorkerError::RepositoryError(e.to_string()),
            other => WorkerError::ServiceError(other.to_string()),
        }
    }
}

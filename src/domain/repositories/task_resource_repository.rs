// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::resource::{ConflictReport, ResourceRequirement, TaskResource};
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 存储的数据无法解析
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 冲突求值函数
///
/// 在保留事务内对最新读取的占用记录重新判定
pub type ConflictEvaluator<'a> = &'a (dyn Fn(&[TaskResource]) -> ConflictReport + Send + Sync);

/// 资源占用仓库特质
///
/// 所有协调器进程共享同一张占用表
#[async_trait]
pub trait TaskResourceRepository: Send + Sync {
    /// 在一个事务内重新判定冲突并写入占用记录
    ///
    /// 只有判定为接受时才写入；返回事务内的判定结果
    async fn reserve(
        &self,
        task_id: Uuid,
        requirements: &[ResourceRequirement],
        evaluate: ConflictEvaluator<'_>,
    ) -> Result<ConflictReport, RepositoryError>;

    /// 查找与任一需求作用于同一资源的占用记录
    async fn find_matching(
        &self,
        requirements: &[ResourceRequirement],
    ) -> Result<Vec<TaskResource>, RepositoryError>;

    /// 查找某个任务持有的占用记录
    async fn find_by_task(&self, task_id: Uuid) -> Result<Vec<TaskResource>, RepositoryError>;

    /// 删除某个任务持有的全部占用记录，返回删除的行数
    async fn delete_by_task(&self, task_id: Uuid) -> Result<u64, RepositoryError>;
}

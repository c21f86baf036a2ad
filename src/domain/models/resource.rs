// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 常用资源类型
///
/// 资源类型只是字符串，协调器不解释其含义，这里列出平台常用的几种
pub mod resource_types {
    pub const REPOSITORY: &str = "repository";
    pub const REPOSITORY_DISTRIBUTOR: &str = "repository_distributor";
    pub const REPOSITORY_IMPORTER: &str = "repository_importer";
    pub const CONSUMER: &str = "consumer";
    pub const CONTENT_UNIT: &str = "content_unit";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const SCHEDULE: &str = "schedule";
    pub const ROLE: &str = "role";
    pub const USER: &str = "user";
}

/// 资源操作枚举
///
/// 一个工作单元针对某个命名资源声明的操作类型，
/// 冲突判定只依赖两两之间的冲突矩阵，不需要全序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// 创建资源
    Create,
    /// 读取资源
    Read,
    /// 更新资源
    Update,
    /// 删除资源
    Delete,
    /// 在资源上执行动作
    Execute,
}

impl Operation {
    /// 所有操作，按声明顺序
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
        Operation::Execute,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Execute => write!(f, "execute"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "execute" => Ok(Operation::Execute),
            _ => Err(format!("Invalid operation: {}", s)),
        }
    }
}

/// 资源需求
///
/// 工作单元声明的一条资源占用：对 `(resource_type, resource_id)` 执行 `operation`。
/// 同一资源上的多条需求彼此独立处理。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// 资源类型
    pub resource_type: String,
    /// 资源ID
    pub resource_id: String,
    /// 声明的操作
    pub operation: Operation,
}

impl ResourceRequirement {
    /// 创建新的资源需求
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            operation,
        }
    }

    /// 将同一资源上的多个操作展开为多条需求
    ///
    /// 重复的操作只保留一次，顺序与输入一致
    ///
    /// # 参数
    ///
    /// * `resource_type` - 资源类型
    /// * `resource_id` - 资源ID
    /// * `operations` - 需要声明的操作列表
    ///
    /// # 返回值
    ///
    /// 每个操作对应一条资源需求
    pub fn expand(resource_type: &str, resource_id: &str, operations: &[Operation]) -> Vec<Self> {
        let mut seen = Vec::with_capacity(operations.len());
        for op in operations {
            if !seen.contains(op) {
                seen.push(*op);
            }
        }
        seen.into_iter()
            .map(|op| Self::new(resource_type, resource_id, op))
            .collect()
    }

    /// 判断是否与某条占用记录作用于同一资源
    pub fn same_resource(&self, resource: &TaskResource) -> bool {
        self.resource_type == resource.resource_type && self.resource_id == resource.resource_id
    }
}

/// 资源占用记录
///
/// 持久化在共享存储中的一行：某个任务当前在某资源上持有某操作。
/// 仅当所属任务已被接受且尚未结束时存在。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResource {
    /// 记录ID
    pub id: Uuid,
    /// 持有该资源的任务ID
    pub task_id: Uuid,
    /// 资源类型
    pub resource_type: String,
    /// 资源ID
    pub resource_id: String,
    /// 持有的操作
    pub operation: Operation,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl TaskResource {
    /// 为任务生成一条资源占用记录
    pub fn for_task(task_id: Uuid, requirement: &ResourceRequirement) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            resource_type: requirement.resource_type.clone(),
            resource_id: requirement.resource_id.clone(),
            operation: requirement.operation,
            created_at: Utc::now(),
        }
    }
}

/// 冲突判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallResponse {
    /// 可以立即执行
    Accepted,
    /// 需等待阻塞任务结束后再提交
    Postponed,
    /// 与进行中的任务永久冲突
    Rejected,
}

impl fmt::Display for CallResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CallResponse::Accepted => write!(f, "accepted"),
            CallResponse::Postponed => write!(f, "postponed"),
            CallResponse::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for CallResponse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(CallResponse::Accepted),
            "postponed" => Ok(CallResponse::Postponed),
            "rejected" => Ok(CallResponse::Rejected),
            _ => Err(format!("Invalid call response: {}", s)),
        }
    }
}

/// 冲突原因
///
/// 描述新请求与哪个进行中的任务在哪个资源上冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReason {
    pub resource_type: String,
    pub resource_id: String,
    /// 进行中任务持有的操作
    pub operation: Operation,
    /// 进行中任务的ID
    pub task_id: Uuid,
}

impl From<&TaskResource> for ConflictReason {
    fn from(resource: &TaskResource) -> Self {
        Self {
            resource_type: resource.resource_type.clone(),
            resource_id: resource.resource_id.clone(),
            operation: resource.operation,
            task_id: resource.task_id,
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} is held for {} by task {}",
            self.resource_type, self.resource_id, self.operation, self.task_id
        )
    }
}

/// 冲突检查报告
///
/// 协调器对一组资源需求的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    /// 总体判定
    pub response: CallResponse,
    /// 导致推迟的任务ID集合
    pub blocking_task_ids: BTreeSet<Uuid>,
    /// 每条拒绝或推迟匹配的原因
    pub reasons: Vec<ConflictReason>,
    /// 与需求作用于同一资源的进行中占用记录
    pub task_resources: Vec<TaskResource>,
}

impl ConflictReport {
    /// 无冲突的报告
    pub fn accepted(task_resources: Vec<TaskResource>) -> Self {
        Self {
            response: CallResponse::Accepted,
            blocking_task_ids: BTreeSet::new(),
            reasons: Vec::new(),
            task_resources,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.response == CallResponse::Accepted
    }
}

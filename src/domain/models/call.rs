// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::resource::{
    CallResponse, ConflictReason, ConflictReport, Operation, ResourceRequirement,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 调用请求
///
/// 一个不透明的工作单元：`task_type` 在执行时通过处理器注册表解析，
/// `payload` 原样交给处理器。协调器只关心 `resources` 中声明的资源占用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// 请求ID
    pub id: Uuid,
    /// 任务类型，用于查找处理器
    pub task_type: String,
    /// 任务负载数据
    pub payload: serde_json::Value,
    /// 声明的资源需求
    #[serde(default)]
    pub resources: Vec<ResourceRequirement>,
    /// 标签，用于检索
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CallRequest {
    /// 创建一个新的调用请求
    ///
    /// # 参数
    ///
    /// * `task_type` - 任务类型
    /// * `payload` - 任务负载数据
    ///
    /// # 返回值
    ///
    /// 返回没有资源需求和标签的调用请求
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            payload,
            resources: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// 追加一条资源需求
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        operation: Operation,
    ) -> Self {
        self.resources
            .push(ResourceRequirement::new(resource_type, resource_id, operation));
        self
    }

    /// 追加多条资源需求
    pub fn with_resources(mut self, requirements: impl IntoIterator<Item = ResourceRequirement>) -> Self {
        self.resources.extend(requirements);
        self
    }

    /// 追加标签
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }
}

/// 调用行程
///
/// 一次调度触发时一起提交的一组调用请求，按声明顺序执行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    /// 行程组ID
    pub group_id: Uuid,
    /// 调用请求列表
    pub calls: Vec<CallRequest>,
}

impl Itinerary {
    pub fn new(calls: Vec<CallRequest>) -> Self {
        Self {
            group_id: Uuid::new_v4(),
            calls,
        }
    }

    /// 序列化为存储格式
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 从存储格式还原
    pub fn deserialize(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// 行程中所有调用的标签并集
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for call in &self.calls {
            for tag in &call.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl From<CallRequest> for Itinerary {
    fn from(call: CallRequest) -> Self {
        Self::new(vec![call])
    }
}

impl From<Vec<CallRequest>> for Itinerary {
    fn from(calls: Vec<CallRequest>) -> Self {
        Self::new(calls)
    }
}

/// 调用状态枚举
///
/// 状态转换遵循以下流程：
/// Waiting → Running → Finished/Error/Canceled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// 等待执行
    #[default]
    Waiting,
    /// 执行中
    Running,
    /// 成功完成
    Finished,
    /// 执行失败或被拒绝
    Error,
    /// 已取消
    Canceled,
}

impl CallState {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Finished | CallState::Error | CallState::Canceled
        )
    }

    /// 是否为错误状态
    pub fn is_error(&self) -> bool {
        *self == CallState::Error
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CallState::Waiting => write!(f, "waiting"),
            CallState::Running => write!(f, "running"),
            CallState::Finished => write!(f, "finished"),
            CallState::Error => write!(f, "error"),
            CallState::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for CallState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(CallState::Waiting),
            "running" => Ok(CallState::Running),
            "finished" => Ok(CallState::Finished),
            "error" => Ok(CallState::Error),
            "canceled" => Ok(CallState::Canceled),
            _ => Err(format!("Invalid call state: {}", s)),
        }
    }
}

/// 调用报告
///
/// 记录一次调用提交后的判定和执行情况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReport {
    /// 任务ID，每次提交生成一个新的
    pub task_id: Uuid,
    /// 对应的调用请求ID
    pub call_request_id: Uuid,
    /// 所属行程组ID
    pub group_id: Option<Uuid>,
    /// 任务类型
    pub task_type: String,
    /// 当前状态
    pub state: CallState,
    /// 冲突判定结果
    pub response: CallResponse,
    /// 处理器返回的结果
    pub result: Option<serde_json::Value>,
    /// 错误信息
    pub error: Option<String>,
    /// 阻塞该调用的任务
    pub blocking_tasks: Vec<Uuid>,
    /// 推迟或拒绝的原因
    pub reasons: Vec<ConflictReason>,
    /// 标签
    pub tags: Vec<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 开始执行时间
    pub start_time: Option<DateTime<Utc>>,
    /// 结束时间
    pub finish_time: Option<DateTime<Utc>>,
}

impl CallReport {
    /// 根据冲突检查结果为一次提交创建报告
    ///
    /// 被拒绝的调用直接进入 Error 终止状态，其余为 Waiting
    pub fn for_submission(
        task_id: Uuid,
        request: &CallRequest,
        group_id: Option<Uuid>,
        conflicts: &ConflictReport,
    ) -> Self {
        let now = Utc::now();
        let rejected = conflicts.response == CallResponse::Rejected;
        Self {
            task_id,
            call_request_id: request.id,
            group_id,
            task_type: request.task_type.clone(),
            state: if rejected {
                CallState::Error
            } else {
                CallState::Waiting
            },
            response: conflicts.response,
            result: None,
            error: rejected.then(|| {
                let reasons: Vec<String> = conflicts.reasons.iter().map(|r| r.to_string()).collect();
                format!("rejected: {}", reasons.join("; "))
            }),
            blocking_tasks: conflicts.blocking_task_ids.iter().copied().collect(),
            reasons: conflicts.reasons.clone(),
            tags: request.tags.clone(),
            created_at: now,
            start_time: None,
            finish_time: rejected.then_some(now),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::resource::{
    CallResponse, ConflictReason, ConflictReport, Operation, ResourceRequirement, TaskResource,
};
use std::collections::BTreeSet;

/// 两个操作之间的冲突关系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// 可以并发执行
    Compatible,
    /// 需等待进行中的任务结束
    Postpone,
    /// 永久冲突
    Reject,
}

/// 判定新请求的操作与进行中操作之间的冲突关系
///
/// # 参数
///
/// * `requested` - 新请求声明的操作
/// * `in_flight` - 进行中任务持有的操作
///
/// # 返回值
///
/// 两者的冲突关系，涉及 Execute 的组合总是兼容
pub fn classify(requested: Operation, in_flight: Operation) -> Conflict {
    use Operation::*;

    match (requested, in_flight) {
        (Create, Create) => Conflict::Reject,
        (Create, Read | Update | Delete) => Conflict::Postpone,

        (Read, Delete) => Conflict::Reject,
        (Read, Create) => Conflict::Postpone,

        (Update, Delete) => Conflict::Reject,
        (Update, Create | Read | Update) => Conflict::Postpone,

        (Delete, Delete) => Conflict::Reject,
        (Delete, Create | Read | Update) => Conflict::Postpone,

        _ => Conflict::Compatible,
    }
}

/// 对一组资源需求和进行中的占用记录求值
///
/// 拒绝优先于推迟，推迟优先于接受。拒绝时列出每条拒绝匹配，
/// 推迟时收集所有推迟匹配的任务ID。
///
/// # 参数
///
/// * `requirements` - 新请求的资源需求
/// * `in_flight` - 进行中的占用记录，可以包含与需求无关的资源
///
/// # 返回值
///
/// 冲突检查报告，`task_resources` 为与需求作用于同一资源的记录
pub fn evaluate_conflicts(
    requirements: &[ResourceRequirement],
    in_flight: &[TaskResource],
) -> ConflictReport {
    let mut matched: Vec<TaskResource> = Vec::new();
    let mut rejecting: Vec<ConflictReason> = Vec::new();
    let mut postponing: Vec<ConflictReason> = Vec::new();
    let mut postponing_tasks: BTreeSet<uuid::Uuid> = BTreeSet::new();

    for resource in in_flight {
        let mut is_match = false;
        for requirement in requirements.iter().filter(|r| r.same_resource(resource)) {
            is_match = true;
            match classify(requirement.operation, resource.operation) {
                Conflict::Reject => rejecting.push(ConflictReason::from(resource)),
                Conflict::Postpone => {
                    postponing_tasks.insert(resource.task_id);
                    postponing.push(ConflictReason::from(resource));
                }
                Conflict::Compatible => {}
            }
        }
        if is_match {
            matched.push(resource.clone());
        }
    }

    rejecting.dedup();
    postponing.dedup();

    if !rejecting.is_empty() {
        ConflictReport {
            response: CallResponse::Rejected,
            blocking_task_ids: BTreeSet::new(),
            reasons: rejecting,
            task_resources: matched,
        }
    } else if !postponing.is_empty() {
        ConflictReport {
            response: CallResponse::Postponed,
            blocking_task_ids: postponing_tasks,
            reasons: postponing,
            task_resources: matched,
        }
    } else {
        ConflictReport::accepted(matched)
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::call::{CallRequest, CallState, Itinerary};
use crate::utils::errors::ServiceError;
use crate::utils::iso8601::parse_repeating_interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 可在创建时指定的选项键
pub const SCHEDULE_OPTION_KEYS: [&str; 3] = ["failure_threshold", "enabled", "tags"];

/// 可在更新时修改的键
pub const SCHEDULE_UPDATE_KEYS: [&str; 5] = [
    "call_request",
    "schedule",
    "failure_threshold",
    "remaining_runs",
    "enabled",
];

/// 定时调用
///
/// 持久化的周期性调用记录。`next_run` 是下一次触发时间的唯一依据，
/// `call_count` 大于 0 表示上一次触发的调用尚未全部结束。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCall {
    pub id: Uuid,
    /// 序列化后的调用行程
    pub serialized_call_request: String,
    /// ISO8601 重复时间间隔
    pub schedule: String,
    pub tags: Vec<String>,
    pub first_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// 剩余运行次数，None 表示不限
    pub remaining_runs: Option<i32>,
    /// 连续失败多少次后自动禁用，None 表示从不禁用
    pub failure_threshold: Option<i32>,
    pub consecutive_failures: i32,
    pub enabled: bool,
    /// 当前运行组中尚未结束的调用数
    pub call_count: i32,
    /// 当前运行组中已结束调用的终止状态
    pub call_exit_states: Vec<CallState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledCall {
    /// 创建新的定时调用
    ///
    /// # 参数
    ///
    /// * `itinerary` - 每次触发时提交的调用行程
    /// * `schedule` - ISO8601 重复时间间隔
    /// * `first_run` - 首次运行时间
    /// * `remaining_runs` - 总运行次数
    /// * `options` - 创建选项
    ///
    /// # 返回值
    ///
    /// * `Ok(ScheduledCall)` - 新的定时调用
    /// * `Err(ServiceError)` - 行程序列化失败或阈值超出存储范围
    pub fn new(
        itinerary: &Itinerary,
        schedule: &str,
        first_run: DateTime<Utc>,
        remaining_runs: Option<i32>,
        options: &ScheduleOptions,
    ) -> Result<Self, ServiceError> {
        let now = Utc::now();
        let mut tags = options.tags.clone();
        for tag in itinerary.tags() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            serialized_call_request: itinerary.serialize()?,
            schedule: schedule.to_string(),
            tags,
            first_run,
            last_run: None,
            next_run: Some(first_run),
            remaining_runs,
            failure_threshold: stored_count("failure_threshold", options.failure_threshold)?,
            consecutive_failures: 0,
            enabled: options.enabled,
            call_count: 0,
            call_exit_states: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// 还原调用行程
    pub fn itinerary(&self) -> Result<Itinerary, serde_json::Error> {
        Itinerary::deserialize(&self.serialized_call_request)
    }

    /// 连续失败次数是否已达到阈值
    pub fn threshold_reached(&self) -> bool {
        self.failure_threshold
            .map(|threshold| self.consecutive_failures >= threshold)
            .unwrap_or(false)
    }

    /// 是否还有调用在运行
    pub fn has_outstanding_calls(&self) -> bool {
        self.call_count > 0
    }

    /// 生成只读视图
    pub fn report(&self) -> ScheduleReport {
        let call_request_ids = self
            .itinerary()
            .map(|itinerary| itinerary.calls.iter().map(|c| c.id).collect())
            .unwrap_or_default();

        ScheduleReport {
            id: self.id,
            schedule: self.schedule.clone(),
            tags: self.tags.clone(),
            call_request_ids,
            first_run: self.first_run,
            last_run: self.last_run,
            next_run: self.next_run,
            remaining_runs: self.remaining_runs,
            failure_threshold: self.failure_threshold,
            consecutive_failures: self.consecutive_failures,
            enabled: self.enabled,
        }
    }
}

/// 定时调用的只读视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub id: Uuid,
    pub schedule: String,
    pub tags: Vec<String>,
    pub call_request_ids: Vec<Uuid>,
    pub first_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub remaining_runs: Option<i32>,
    pub failure_threshold: Option<i32>,
    pub consecutive_failures: i32,
    pub enabled: bool,
}

/// 创建定时调用的选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// 连续失败多少次后自动禁用
    pub failure_threshold: Option<u32>,
    /// 创建后是否立即启用
    pub enabled: bool,
    /// 额外的标签
    pub tags: Vec<String>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            failure_threshold: None,
            enabled: true,
            tags: Vec::new(),
        }
    }
}

impl ScheduleOptions {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 校验选项取值
    pub fn validate(&self) -> Result<(), ServiceError> {
        match self.failure_threshold {
            Some(threshold) if threshold == 0 || threshold > i32::MAX as u32 => Err(
                ServiceError::invalid_value("failure_threshold", "must be a positive integer"),
            ),
            _ => Ok(()),
        }
    }
}

impl TryFrom<&Map<String, Value>> for ScheduleOptions {
    type Error = ServiceError;

    fn try_from(raw: &Map<String, Value>) -> Result<Self, Self::Error> {
        reject_unknown_keys(raw, &SCHEDULE_OPTION_KEYS)?;

        let mut options = ScheduleOptions::default();
        if let Some(value) = raw.get("failure_threshold") {
            options.failure_threshold = optional_positive_int("failure_threshold", value)?;
        }
        if let Some(value) = raw.get("enabled") {
            options.enabled = bool_value("enabled", value)?;
        }
        if let Some(value) = raw.get("tags") {
            options.tags = tag_list("tags", value)?;
        }
        Ok(options)
    }
}

/// 经过校验的定时调用更新
///
/// 外层 `Option` 表示是否修改该字段，内层 `Option` 的 None 表示清空
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleUpdate {
    pub call_request: Option<Itinerary>,
    pub schedule: Option<String>,
    pub failure_threshold: Option<Option<u32>>,
    pub remaining_runs: Option<Option<u32>>,
    pub enabled: Option<bool>,
}

impl ScheduleUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// 新的调度表达式及其首次运行时间
#[derive(Debug, Clone, PartialEq)]
pub struct Reschedule {
    pub schedule: String,
    pub first_run: DateTime<Utc>,
}

/// 写入存储的定义字段变更
///
/// 只有取值为 `Some` 的列会被写入；计数器列不在其中。
/// `reschedule` 同时写入 `first_run` 和 `next_run`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleChanges {
    pub serialized_call_request: Option<String>,
    pub tags: Option<Vec<String>>,
    pub reschedule: Option<Reschedule>,
    pub remaining_runs: Option<Option<i32>>,
    pub failure_threshold: Option<Option<i32>>,
    pub enabled: Option<bool>,
}

impl ScheduleChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// 将次数转换为存储使用的 `i32`，超出范围时报告字段取值不合法
pub fn stored_count(field: &str, count: Option<u32>) -> Result<Option<i32>, ServiceError> {
    count
        .map(i32::try_from)
        .transpose()
        .map_err(|_| ServiceError::invalid_value(field, format!("must not exceed {}", i32::MAX)))
}

impl TryFrom<&Map<String, Value>> for ScheduleUpdate {
    type Error = ServiceError;

    fn try_from(raw: &Map<String, Value>) -> Result<Self, Self::Error> {
        reject_unknown_keys(raw, &SCHEDULE_UPDATE_KEYS)?;

        let mut update = ScheduleUpdate::default();
        if let Some(value) = raw.get("call_request") {
            update.call_request = Some(itinerary_value(value)?);
        }
        if let Some(value) = raw.get("schedule") {
            let schedule = value
                .as_str()
                .ok_or_else(|| ServiceError::invalid_value("schedule", "must be a string"))?;
            parse_repeating_interval(schedule)
                .map_err(|e| ServiceError::invalid_value("schedule", e.to_string()))?;
            update.schedule = Some(schedule.to_string());
        }
        if let Some(value) = raw.get("failure_threshold") {
            update.failure_threshold = Some(optional_positive_int("failure_threshold", value)?);
        }
        if let Some(value) = raw.get("remaining_runs") {
            update.remaining_runs = Some(optional_positive_int("remaining_runs", value)?);
        }
        if let Some(value) = raw.get("enabled") {
            update.enabled = Some(bool_value("enabled", value)?);
        }
        Ok(update)
    }
}

fn reject_unknown_keys(raw: &Map<String, Value>, allowed: &[&str]) -> Result<(), ServiceError> {
    let mut unknown: Vec<String> = raw
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort();
    Err(ServiceError::UnsupportedValue { fields: unknown })
}

fn optional_positive_int(field: &str, value: &Value) -> Result<Option<u32>, ServiceError> {
    if value.is_null() {
        return Ok(None);
    }
    match value.as_u64() {
        Some(n) if n >= 1 && n <= i32::MAX as u64 => Ok(Some(n as u32)),
        _ => Err(ServiceError::invalid_value(
            field,
            "must be a positive integer or null",
        )),
    }
}

fn bool_value(field: &str, value: &Value) -> Result<bool, ServiceError> {
    value
        .as_bool()
        .ok_or_else(|| ServiceError::invalid_value(field, "must be a boolean"))
}

fn tag_list(field: &str, value: &Value) -> Result<Vec<String>, ServiceError> {
    let items = value
        .as_array()
        .ok_or_else(|| ServiceError::invalid_value(field, "must be a list of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ServiceError::invalid_value(field, "must be a list of strings"))
        })
        .collect()
}

/// 接受行程、单个调用请求或调用请求列表
fn itinerary_value(value: &Value) -> Result<Itinerary, ServiceError> {
    let itinerary = if let Ok(itinerary) = serde_json::from_value::<Itinerary>(value.clone()) {
        itinerary
    } else if let Ok(call) = serde_json::from_value::<CallRequest>(value.clone()) {
        Itinerary::from(call)
    } else if let Ok(calls) = serde_json::from_value::<Vec<CallRequest>>(value.clone()) {
        Itinerary::from(calls)
    } else {
        return Err(ServiceError::invalid_value(
            "call_request",
            "must be a call request, a list of call requests or an itinerary",
        ));
    };

    if itinerary.is_empty() {
        return Err(ServiceError::invalid_value(
            "call_request",
            "must contain at least one call",
        ));
    }
    Ok(itinerary)
}

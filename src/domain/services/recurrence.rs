// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 周期计算
//!
//! 根据 ISO8601 重复时间间隔计算首次和下一次运行时间。
//! 错过的多个周期会合并为一次，不会积压。

use crate::domain::models::scheduled_call::ScheduledCall;
use crate::utils::iso8601::{parse_repeating_interval, IsoDuration, Iso8601Error};
use chrono::{DateTime, Utc};

/// 首次运行计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstRun {
    pub first_run: DateTime<Utc>,
    /// 总运行次数，None 表示不限
    pub run_count: Option<u32>,
}

/// 计算首次运行时间
///
/// # 参数
///
/// * `schedule` - ISO8601 重复时间间隔
/// * `now` - 当前时间
///
/// # 返回值
///
/// * `Ok(Some(FirstRun))` - 首次运行时间和总运行次数
/// * `Ok(None)` - 该调度不会运行（例如 `R0/...`）
/// * `Err(Iso8601Error)` - 表达式无法解析
pub fn calculate_first_run(
    schedule: &str,
    now: DateTime<Utc>,
) -> Result<Option<FirstRun>, Iso8601Error> {
    let parsed = parse_repeating_interval(schedule)?;
    if parsed.run_count == Some(0) {
        return Ok(None);
    }

    let first_run = match parsed.start {
        None => Some(now),
        Some(start) if start > now || parsed.interval.is_zero() => Some(start),
        Some(start) => advance_past(start, &parsed.interval, now),
    };

    Ok(first_run.map(|first_run| FirstRun {
        first_run,
        run_count: parsed.run_count,
    }))
}

/// 计算下一次运行时间
///
/// 从 `last_run` 开始按间隔推进，直到严格晚于 `now`
///
/// # 参数
///
/// * `call` - 定时调用
/// * `now` - 当前时间
///
/// # 返回值
///
/// * `Ok(Some(time))` - 下一次运行时间
/// * `Ok(None)` - 不再运行，调用方应删除该定时调用
/// * `Err(Iso8601Error)` - 存储的调度表达式无法解析
pub fn calculate_next_run(
    call: &ScheduledCall,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, Iso8601Error> {
    if call.remaining_runs == Some(0) {
        return Ok(None);
    }

    let last_run = match call.last_run {
        None => return Ok(Some(call.first_run)),
        Some(last_run) => last_run,
    };

    let parsed = parse_repeating_interval(&call.schedule)?;
    if parsed.interval.is_zero() {
        return Ok(None);
    }
    Ok(advance_past(last_run, &parsed.interval, now))
}

/// 从 `from` 开始按间隔推进，返回第一个严格晚于 `now` 的时间
fn advance_past(
    from: DateTime<Utc>,
    interval: &IsoDuration,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut candidate = from;

    // 定长间隔直接跳到最后一个错过的时间点
    if interval.years == 0 && interval.months == 0 && candidate <= now {
        let step = interval.add_to(candidate)?.signed_duration_since(candidate);
        let step_ms = step.num_milliseconds();
        if step_ms > 0 {
            let elapsed_ms = now.signed_duration_since(candidate).num_milliseconds();
            let skipped = elapsed_ms / step_ms;
            candidate = candidate.checked_add_signed(step.checked_mul(i32::try_from(skipped).ok()?)?)?;
        }
    }

    while candidate <= now {
        let next = interval.add_to(candidate)?;
        if next <= candidate {
            return None;
        }
        candidate = next;
    }
    Some(candidate)
}

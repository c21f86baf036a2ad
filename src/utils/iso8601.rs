// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! ISO8601 重复时间间隔解析
//!
//! 支持的形式：
//! - `R5/2024-01-01T00:00:00Z/P1D`：从起始时间开始，共运行5次，每天一次
//! - `R/2024-01-01T00:00:00Z/PT1H`：不限次数
//! - `2024-01-01T00:00:00Z/P1W`：起始时间加间隔，不限次数
//! - `PT30M` / `R3/PT30M`：从当前时间开始
//! - `2024-01-01T00:00:00Z`：单次运行

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:[.,]\d+)?)S)?)?$",
    )
    .expect("duration pattern is valid")
});

/// ISO8601 解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Iso8601Error {
    #[error("invalid ISO8601 duration: {0}")]
    InvalidDuration(String),

    #[error("invalid ISO8601 date time: {0}")]
    InvalidDateTime(String),

    #[error("invalid repetition count: {0}")]
    InvalidRunCount(String),

    #[error("unsupported ISO8601 interval: {0}")]
    Unsupported(String),
}

/// ISO8601 时长
///
/// 年和月按日历计算，其余部分按固定长度计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsoDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub milliseconds: u64,
}

impl IsoDuration {
    /// 解析 `PnYnMnWnDTnHnMnS` 形式的时长
    pub fn parse(raw: &str) -> Result<Self, Iso8601Error> {
        let invalid = || Iso8601Error::InvalidDuration(raw.to_string());
        if raw == "P" || raw.ends_with('T') {
            return Err(invalid());
        }
        let caps = DURATION_RE.captures(raw).ok_or_else(invalid)?;

        let int = |idx: usize| -> Result<u32, Iso8601Error> {
            caps.get(idx)
                .map(|m| m.as_str().parse::<u32>().map_err(|_| invalid()))
                .unwrap_or(Ok(0))
        };
        let milliseconds = match caps.get(7) {
            Some(m) => {
                let secs: f64 = m.as_str().replace(',', ".").parse().map_err(|_| invalid())?;
                (secs * 1000.0).round() as u64
            }
            None => 0,
        };

        Ok(Self {
            years: int(1)?,
            months: int(2)?,
            weeks: int(3)?,
            days: int(4)?,
            hours: int(5)?,
            minutes: int(6)?,
            milliseconds,
        })
    }

    /// 是否为零长度（非重复）
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// 将时长加到某个时间点上
    ///
    /// 溢出时返回 None
    pub fn add_to(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = if months > 0 {
            at.checked_add_months(Months::new(months))?
        } else {
            at
        };
        let fixed = Duration::try_weeks(i64::from(self.weeks))?
            .checked_add(&Duration::try_days(i64::from(self.days))?)?
            .checked_add(&Duration::try_hours(i64::from(self.hours))?)?
            .checked_add(&Duration::try_minutes(i64::from(self.minutes))?)?
            .checked_add(&Duration::try_milliseconds(i64::try_from(self.milliseconds).ok()?)?)?;
        shifted.checked_add_signed(fixed)
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "PT0S");
        }
        write!(f, "P")?;
        for (value, unit) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value > 0 {
                write!(f, "{}{}", value, unit)?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.milliseconds > 0 {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.milliseconds > 0 {
                if self.milliseconds % 1000 == 0 {
                    write!(f, "{}S", self.milliseconds / 1000)?;
                } else {
                    write!(f, "{}S", self.milliseconds as f64 / 1000.0)?;
                }
            }
        }
        Ok(())
    }
}

/// 解析后的重复时间间隔
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatingInterval {
    /// 间隔，零表示不重复
    pub interval: IsoDuration,
    /// 起始时间，缺省表示当前时间
    pub start: Option<DateTime<Utc>>,
    /// 总运行次数，缺省表示不限
    pub run_count: Option<u32>,
}

/// 解析 ISO8601 重复时间间隔表达式
///
/// # 参数
///
/// * `raw` - 调度表达式
///
/// # 返回值
///
/// * `Ok(RepeatingInterval)` - 解析结果
/// * `Err(Iso8601Error)` - 表达式格式错误或不受支持
pub fn parse_repeating_interval(raw: &str) -> Result<RepeatingInterval, Iso8601Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Iso8601Error::Unsupported(raw.to_string()));
    }

    let mut parts: Vec<&str> = raw.split('/').collect();

    let mut run_count = None;
    let mut repeating = false;
    if let Some(first) = parts.first() {
        if let Some(count) = first.strip_prefix('R') {
            repeating = true;
            if !count.is_empty() {
                run_count = Some(
                    count
                        .parse::<u32>()
                        .map_err(|_| Iso8601Error::InvalidRunCount(count.to_string()))?,
                );
            }
            parts.remove(0);
        }
    }

    let (start, interval) = match parts.as_slice() {
        [duration] if duration.starts_with('P') => (None, IsoDuration::parse(duration)?),
        [start] => (Some(parse_datetime(start)?), IsoDuration::default()),
        [start, duration] if duration.starts_with('P') => {
            (Some(parse_datetime(start)?), IsoDuration::parse(duration)?)
        }
        _ => return Err(Iso8601Error::Unsupported(raw.to_string())),
    };

    // 只有开始时间且没有重复部分时只运行一次
    let run_count = if interval.is_zero() {
        match (repeating, run_count) {
            (false, _) => Some(1),
            (true, Some(count)) if count <= 1 => Some(count),
            _ => return Err(Iso8601Error::Unsupported(raw.to_string())),
        }
    } else {
        run_count
    };

    Ok(RepeatingInterval {
        interval,
        start,
        run_count,
    })
}

/// 解析 ISO8601 时间点，无时区信息时按 UTC 处理
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, Iso8601Error> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Iso8601Error::InvalidDateTime(raw.to_string()))
}

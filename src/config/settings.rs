// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、协调器、调度器、工作池、报告保留和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 协调器配置
    pub coordinator: CoordinatorSettings,
    /// 调度器配置
    pub scheduler: SchedulerSettings,
    /// 工作池配置
    pub worker_pool: WorkerPoolSettings,
    /// 调用报告保留配置
    pub reports: ReportSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
    /// 是否输出SQL日志
    pub sqlx_logging: bool,
}

/// 协调器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSettings {
    /// 同步等待时轮询调用报告的间隔（毫秒）
    pub wait_poll_interval_ms: u64,
    /// 同步执行的默认超时（秒）
    pub default_wait_timeout_secs: u64,
    /// 资源保留事务冲突时的重试次数
    pub reserve_retries: u32,
}

impl CoordinatorSettings {
    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms.max(1))
    }

    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.default_wait_timeout_secs)
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            wait_poll_interval_ms: 250,
            default_wait_timeout_secs: 300,
            reserve_retries: 3,
        }
    }
}

/// 调度器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// 是否启动调度循环
    pub enabled: bool,
    /// 调度循环的唤醒间隔（秒）
    pub dispatch_interval_secs: u64,
}

impl SchedulerSettings {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs.max(1))
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dispatch_interval_secs: 30,
        }
    }
}

/// 工作池配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolSettings {
    /// 同时运行的工作单元上限
    pub concurrency: usize,
}

/// 调用报告保留配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ReportSettings {
    /// 已结束的报告保留多少小时，0 表示永久保留
    pub retention_hours: u64,
    /// 清理周期（秒）
    pub purge_interval_secs: u64,
}

impl ReportSettings {
    /// 保留时长，永久保留时返回 None
    pub fn retention(&self) -> Option<chrono::Duration> {
        let hours = i64::try_from(self.retention_hours).ok()?;
        (hours > 0).then(|| chrono::Duration::hours(hours))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            retention_hours: 168,
            purge_interval_secs: 3600,
        }
    }
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出
    pub enabled: bool,
    /// 导出器监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 和 `DISPATCHRS__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("DISPATCHRS").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// 内置默认值
    pub(crate) fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // 数据库连接池
            .set_default("database.url", "sqlite://dispatchrs.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("database.sqlx_logging", false)?
            // 协调器
            .set_default("coordinator.wait_poll_interval_ms", 250)?
            .set_default("coordinator.default_wait_timeout_secs", 300)?
            .set_default("coordinator.reserve_retries", 3)?
            // 调度器
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.dispatch_interval_secs", 30)?
            // 工作池
            .set_default("worker_pool.concurrency", 16)?
            // 调用报告保留
            .set_default("reports.retention_hours", 168)?
            .set_default("reports.purge_interval_secs", 3600)?
            // 指标
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }
}

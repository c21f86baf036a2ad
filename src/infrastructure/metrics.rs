// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const CALLS_TOTAL: &str = "dispatch_calls_total";
pub const CALLS_COMPLETED_TOTAL: &str = "dispatch_calls_completed_total";
pub const CALL_DURATION_SECONDS: &str = "dispatch_call_duration_seconds";
pub const SCHEDULE_FIRES_TOTAL: &str = "dispatch_schedule_fires_total";
pub const SCHEDULE_SKIPS_TOTAL: &str = "dispatch_schedule_skips_total";
pub const SCHEDULES_DISABLED_TOTAL: &str = "dispatch_schedules_disabled_total";
pub const RESERVATION_RELEASE_FAILURES_TOTAL: &str = "dispatch_reservation_release_failures_total";

/// 初始化指标系统
///
/// 启用时安装 Prometheus 导出器并注册指标说明
///
/// # 参数
///
/// * `settings` - 指标配置
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", settings.listen_addr, e);
            return;
        }
    };

    // 地址已被占用时忽略错误（开发和测试环境）
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!(CALLS_TOTAL, "Calls submitted to the coordinator, by conflict response");
    describe_counter!(CALLS_COMPLETED_TOTAL, "Calls that reached a terminal state, by state");
    describe_histogram!(CALL_DURATION_SECONDS, "Handler run time of accepted calls in seconds");
    describe_counter!(SCHEDULE_FIRES_TOTAL, "Scheduled calls fired by the dispatch loop");
    describe_counter!(
        SCHEDULE_SKIPS_TOTAL,
        "Scheduled calls skipped because the previous run was still outstanding"
    );
    describe_counter!(
        SCHEDULES_DISABLED_TOTAL,
        "Scheduled calls disabled after reaching their failure threshold"
    );
    describe_counter!(
        RESERVATION_RELEASE_FAILURES_TOTAL,
        "Completed tasks whose resource reservations could not be released"
    );
}

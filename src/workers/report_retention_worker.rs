// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::call_report_repository::CallReportRepository;
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// 调用报告清理工作器
///
/// 定期删除超过保留时长的已结束报告和未再提交的推迟报告
pub struct ReportRetentionWorker {
    reports: Arc<dyn CallReportRepository>,
    retention: chrono::Duration,
    purge_interval: Duration,
    shutdown: Arc<Notify>,
}

impl ReportRetentionWorker {
    pub fn new(
        reports: Arc<dyn CallReportRepository>,
        retention: chrono::Duration,
        purge_interval: Duration,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            reports,
            retention,
            purge_interval,
            shutdown,
        }
    }

    /// 执行一次清理，返回删除的报告数
    pub async fn purge_expired(&self) -> Result<u64, WorkerError> {
        let cutoff = Utc::now() - self.retention;
        self.reports
            .purge_before(cutoff)
            .await
            .map_err(|e| WorkerError::RepositoryError(e.to_string()))
    }
}

#[async_trait]
impl Worker for ReportRetentionWorker {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("Report retention worker started, keeping {}", self.retention);

        let mut interval = interval(self.purge_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.purge_expired().await {
                        Ok(count) => {
                            if count > 0 {
                                info!("Purged {} expired call reports", count);
                            }
                        }
                        Err(e) => error!("Failed to purge call reports: {}", e),
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Report retention worker stopping");
                    return Ok(());
                }
            }
        }
    }

    fn name(&self) -> &str {
        "report-retention-worker"
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::scheduler::Scheduler;
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// 定时调用分发工作器
///
/// 按固定间隔执行调度周期，收到停止通知后退出
pub struct DispatchWorker {
    scheduler: Arc<Scheduler>,
    dispatch_interval: Duration,
    shutdown: Arc<Notify>,
}

impl DispatchWorker {
    pub fn new(scheduler: Arc<Scheduler>, dispatch_interval: Duration, shutdown: Arc<Notify>) -> Self {
        Self {
            scheduler,
            dispatch_interval,
            shutdown,
        }
    }
}

#[async_trait]
impl Worker for DispatchWorker {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("Dispatch worker started");

        let mut interval = interval(self.dispatch_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.scheduler.now();
                    if let Err(e) = self.scheduler.run_due_calls(now).await {
                        error!("Dispatch cycle failed: {}", e);
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Dispatch worker stopping");
                    return Ok(());
                }
            }
        }
    }

    fn name(&self) -> &str {
        "dispatch-worker"
    }
}

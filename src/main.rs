// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use dispatchrs::config::settings::Settings;
use dispatchrs::domain::services::coordinator::Coordinator;
use dispatchrs::infrastructure::database::connection;
use dispatchrs::infrastructure::metrics;
use dispatchrs::infrastructure::repositories::call_report_repo_impl::CallReportRepositoryImpl;
use dispatchrs::infrastructure::repositories::scheduled_call_repo_impl::ScheduledCallRepositoryImpl;
use dispatchrs::infrastructure::repositories::task_resource_repo_impl::TaskResourceRepositoryImpl;
use dispatchrs::queue::handler_registry::{HandlerError, HandlerRegistry};
use dispatchrs::queue::scheduler::Scheduler;
use dispatchrs::queue::task_queue::TokioWorkerPool;
use dispatchrs::utils::telemetry;
use dispatchrs::workers::report_retention_worker::ReportRetentionWorker;
use dispatchrs::workers::Worker;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};
use uuid::Uuid;

/// 主函数
///
/// 初始化存储、工作池、协调器和调度器，运行到收到 Ctrl-C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化日志
    telemetry::init_telemetry();
    info!("Starting dispatchrs...");

    // 2. 加载配置
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    metrics::init_metrics(&settings.metrics);

    // 3. 连接数据库
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    info!("Running database migrations...");
    connection::run_migrations(db.as_ref()).await?;
    info!("Database migrations applied");

    // 4. 初始化组件
    let resource_repo = Arc::new(TaskResourceRepositoryImpl::new(db.clone()));
    let report_repo = Arc::new(CallReportRepositoryImpl::new(db.clone()));
    let schedule_repo = Arc::new(ScheduledCallRepositoryImpl::new(db.clone()));

    let registry = HandlerRegistry::new();
    registry.register("echo", |_task_id: Uuid, payload: Value| async move {
        Ok::<Value, HandlerError>(payload)
    });
    info!("Registered task types: {:?}", registry.task_types());

    let pool = Arc::new(TokioWorkerPool::new(
        registry,
        settings.worker_pool.concurrency,
    ));
    let coordinator = Arc::new(Coordinator::new(
        resource_repo,
        report_repo.clone(),
        pool.clone(),
        settings.coordinator.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        schedule_repo,
        coordinator.clone(),
        settings.scheduler.clone(),
    ));

    // 5. 启动调度循环和报告清理
    if settings.scheduler.enabled {
        scheduler.start()?;
    } else {
        info!("Scheduler disabled by configuration");
    }

    let retention_shutdown = Arc::new(Notify::new());
    let retention_handle = settings.reports.retention().map(|retention| {
        let worker = ReportRetentionWorker::new(
            report_repo,
            retention,
            settings.reports.purge_interval(),
            retention_shutdown.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Worker {} stopped with error: {}", worker.name(), e);
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if scheduler.is_running() {
        scheduler.stop().await?;
    }
    if let Some(handle) = retention_handle {
        retention_shutdown.notify_one();
        handle.await?;
    }
    pool.close();
    info!("dispatchrs stopped");

    Ok(())
}

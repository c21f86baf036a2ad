// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dispatchrs::config::settings::{CoordinatorSettings, SchedulerSettings};
use dispatchrs::domain::services::coordinator::Coordinator;
use dispatchrs::infrastructure::repositories::call_report_repo_impl::CallReportRepositoryImpl;
use dispatchrs::infrastructure::repositories::scheduled_call_repo_impl::ScheduledCallRepositoryImpl;
use dispatchrs::infrastructure::repositories::task_resource_repo_impl::TaskResourceRepositoryImpl;
use dispatchrs::queue::handler_registry::{HandlerError, HandlerRegistry};
use dispatchrs::queue::scheduler::{Clock, Scheduler};
use dispatchrs::queue::task_queue::TokioWorkerPool;
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[allow(dead_code)]
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub resources: Arc<TaskResourceRepositoryImpl>,
    pub reports: Arc<CallReportRepositoryImpl>,
    pub schedules: Arc<ScheduledCallRepositoryImpl>,
    pub registry: HandlerRegistry,
    pub pool: Arc<TokioWorkerPool>,
    pub coordinator: Arc<Coordinator>,
    pub scheduler: Arc<Scheduler>,
    /// `blocked` 处理器在取得许可前一直等待
    pub gate: Arc<Semaphore>,
    /// 调度器使用的当前时间
    pub clock: Arc<Mutex<DateTime<Utc>>>,
}

impl TestApp {
    /// 放行指定数量的 `blocked` 调用
    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn set_time(&self, now: DateTime<Utc>) {
        *self.clock.lock() = now;
    }
}

/// 解析 RFC3339 时间
pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// 创建内存数据库并运行迁移
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    // 只用一个连接，保证所有查询落在同一个内存数据库上
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to database");
    Migrator::up(&db, None).await.expect("Failed to run migrations");
    Arc::new(db)
}

fn test_registry(gate: Arc<Semaphore>) -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    registry.register("ok", |_task_id: Uuid, payload: Value| async move {
        Ok::<Value, HandlerError>(payload)
    });
    registry.register("fail", |_task_id: Uuid, _payload: Value| async move {
        Err::<Value, _>(HandlerError::from("handler failed"))
    });
    registry.register("panic", |_task_id: Uuid, _payload: Value| async move {
        if true {
            panic!("handler exploded");
        }
        Ok::<Value, HandlerError>(Value::Null)
    });
    registry.register("blocked", move |_task_id: Uuid, _payload: Value| {
        let gate = gate.clone();
        async move {
            gate.acquire()
                .await
                .map_err(|e| HandlerError(e.to_string()))?
                .forget();
            Ok::<Value, HandlerError>(json!("released"))
        }
    });
    registry
}

/// 创建完整的测试应用，调度器时间固定在 2023-12-01
pub async fn create_test_app() -> TestApp {
    let db = create_test_db().await;
    let resources = Arc::new(TaskResourceRepositoryImpl::new(db.clone()));
    let reports = Arc::new(CallReportRepositoryImpl::new(db.clone()));
    let schedules = Arc::new(ScheduledCallRepositoryImpl::new(db.clone()));

    let gate = Arc::new(Semaphore::new(0));
    let registry = test_registry(gate.clone());
    let pool = Arc::new(TokioWorkerPool::new(registry.clone(), 8));

    let coordinator = Arc::new(Coordinator::new(
        resources.clone(),
        reports.clone(),
        pool.clone(),
        CoordinatorSettings {
            wait_poll_interval_ms: 10,
            default_wait_timeout_secs: 5,
            reserve_retries: 3,
        },
    ));

    let clock = Arc::new(Mutex::new(at("2023-12-01T00:00:00Z")));
    let now = clock.clone();
    let scheduler_clock: Clock = Arc::new(move || *now.lock());
    let scheduler = Arc::new(
        Scheduler::new(
            schedules.clone(),
            coordinator.clone(),
            SchedulerSettings {
                enabled: true,
                dispatch_interval_secs: 1,
            },
        )
        .with_clock(scheduler_clock),
    );

    TestApp {
        db,
        resources,
        reports,
        schedules,
        registry,
        pool,
        coordinator,
        scheduler,
        gate,
        clock,
    }
}

/// 轮询直到条件成立，最多等待 5 秒
pub async fn eventually<F, Fut>(description: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", description);
}

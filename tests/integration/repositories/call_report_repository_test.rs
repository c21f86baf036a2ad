// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use chrono::{Duration, Utc};
use dispatchrs::domain::models::call::{CallReport, CallRequest, CallState};
use dispatchrs::domain::models::resource::{CallResponse, ConflictReport, Operation};
use dispatchrs::domain::repositories::call_report_repository::CallReportRepository;
use dispatchrs::infrastructure::repositories::call_report_repo_impl::CallReportRepositoryImpl;
use serde_json::json;
use uuid::Uuid;

fn submitted(group_id: Option<Uuid>) -> CallReport {
    let request = CallRequest::new("sync", json!({"repo": "repo-1"}))
        .with_resource("repository", "repo-1", Operation::Read)
        .with_tag("repo-1");
    CallReport::for_submission(Uuid::new_v4(), &request, group_id, &ConflictReport::accepted(Vec::new()))
}

#[tokio::test]
async fn test_report_lifecycle() {
    let repo = CallReportRepositoryImpl::new(create_test_db().await);
    let report = submitted(None);

    let created = repo.create(&report).await.unwrap();
    assert_eq!(created.state, CallState::Waiting);

    let started = Utc::now();
    repo.mark_running(report.task_id, started).await.unwrap();
    let running = repo.find_by_id(report.task_id).await.unwrap().unwrap();
    assert_eq!(running.state, CallState::Running);
    assert!(running.start_time.is_some());

    let finished = repo
        .finish(
            report.task_id,
            CallState::Finished,
            Some(json!({"synced": 3})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(finished.state, CallState::Finished);
    assert_eq!(finished.result, Some(json!({"synced": 3})));
    assert!(finished.finish_time.is_some());
    assert_eq!(finished.tags, vec!["repo-1".to_string()]);
    assert_eq!(finished.call_request_id, report.call_request_id);

    // 已结束的调用不会回到运行中
    repo.mark_running(report.task_id, Utc::now()).await.unwrap();
    let stored = repo.find_by_id(report.task_id).await.unwrap().unwrap();
    assert_eq!(stored.state, CallState::Finished);
}

#[tokio::test]
async fn test_find_by_group_and_missing_reports() {
    let repo = CallReportRepositoryImpl::new(create_test_db().await);
    let group_id = Uuid::new_v4();

    repo.create(&submitted(Some(group_id))).await.unwrap();
    repo.create(&submitted(Some(group_id))).await.unwrap();
    repo.create(&submitted(None)).await.unwrap();

    assert_eq!(repo.find_by_group(group_id).await.unwrap().len(), 2);
    assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    assert!(repo
        .finish(Uuid::new_v4(), CallState::Error, None, Some("lost".to_string()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_purge_before_removes_expired_reports() {
    let repo = CallReportRepositoryImpl::new(create_test_db().await);
    let now = Utc::now();

    let finished = submitted(None);
    repo.create(&finished).await.unwrap();
    repo.finish(finished.task_id, CallState::Finished, None, None)
        .await
        .unwrap();

    let running = submitted(None);
    repo.create(&running).await.unwrap();
    repo.mark_running(running.task_id, now).await.unwrap();

    let mut stale_postponed = submitted(None);
    stale_postponed.response = CallResponse::Postponed;
    stale_postponed.created_at = now - Duration::days(2);
    repo.create(&stale_postponed).await.unwrap();

    let mut fresh_postponed = submitted(None);
    fresh_postponed.response = CallResponse::Postponed;
    repo.create(&fresh_postponed).await.unwrap();

    // 被接受但尚未开始的调用不会被清理
    let mut queued = submitted(None);
    queued.created_at = now - Duration::days(2);
    repo.create(&queued).await.unwrap();

    assert_eq!(repo.purge_before(now - Duration::days(1)).await.unwrap(), 1);
    assert!(repo
        .find_by_id(stale_postponed.task_id)
        .await
        .unwrap()
        .is_none());
    assert!(repo.find_by_id(finished.task_id).await.unwrap().is_some());

    assert_eq!(
        repo.purge_before(Utc::now() + Duration::minutes(1))
            .await
            .unwrap(),
        2
    );
    assert!(repo.find_by_id(finished.task_id).await.unwrap().is_none());
    assert!(repo
        .find_by_id(fresh_postponed.task_id)
        .await
        .unwrap()
        .is_none());
    assert!(repo.find_by_id(running.task_id).await.unwrap().is_some());
    assert!(repo.find_by_id(queued.task_id).await.unwrap().is_some());
}

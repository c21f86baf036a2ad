// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::{at, create_test_db};
use dispatchrs::domain::models::call::{CallRequest, CallState, Itinerary};
use dispatchrs::domain::models::scheduled_call::{
    Reschedule, ScheduleChanges, ScheduleOptions, ScheduledCall,
};
use dispatchrs::domain::repositories::scheduled_call_repository::ScheduledCallRepository;
use dispatchrs::infrastructure::repositories::scheduled_call_repo_impl::ScheduledCallRepositoryImpl;
use serde_json::json;
use uuid::Uuid;

fn hourly(remaining_runs: Option<i32>, options: ScheduleOptions) -> ScheduledCall {
    let itinerary = Itinerary::new(vec![
        CallRequest::new("sync", json!({"step": 1})),
        CallRequest::new("publish", json!({"step": 2})),
    ]);
    ScheduledCall::new(
        &itinerary,
        "R/2024-01-01T00:00:00Z/PT1H",
        at("2024-01-01T00:00:00Z"),
        remaining_runs,
        &options,
    )
    .unwrap()
}

#[tokio::test]
async fn test_create_and_find_due() {
    let repo = ScheduledCallRepositoryImpl::new(create_test_db().await);
    let call = repo
        .create(&hourly(None, ScheduleOptions::default()))
        .await
        .unwrap();
    repo.create(&hourly(None, ScheduleOptions::default().disabled()))
        .await
        .unwrap();

    let stored = repo.find_by_id(call.id).await.unwrap().unwrap();
    assert_eq!(stored.next_run, Some(at("2024-01-01T00:00:00Z")));
    assert_eq!(stored.itinerary().unwrap().len(), 2);

    assert!(repo
        .find_due(at("2023-12-31T23:59:59Z"))
        .await
        .unwrap()
        .is_empty());
    let due = repo.find_due(at("2024-01-01T00:00:00Z")).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, call.id);

    assert_eq!(repo.find_all().await.unwrap().len(), 2);
    assert!(repo.delete(call.id).await.unwrap());
    assert!(!repo.delete(call.id).await.unwrap());
    assert!(repo.find_by_id(call.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_dispatch_bookkeeping() {
    let repo = ScheduledCallRepositoryImpl::new(create_test_db().await);
    let call = repo
        .create(&hourly(Some(2), ScheduleOptions::default()))
        .await
        .unwrap();

    assert!(repo
        .mark_dispatched(
            call.id,
            at("2024-01-01T00:00:00Z"),
            Some(at("2024-01-01T01:00:00Z")),
            2,
        )
        .await
        .unwrap());
    // 尚有未结束的调用时不能再次触发
    assert!(!repo
        .mark_dispatched(call.id, at("2024-01-01T01:00:00Z"), None, 2)
        .await
        .unwrap());

    let run = at("2024-01-01T00:00:00Z");
    // 其他运行组的退出不计入当前运行组
    assert!(repo
        .record_exit_state(call.id, at("2023-12-31T23:00:00Z"), CallState::Finished)
        .await
        .unwrap()
        .is_none());

    let first = repo
        .record_exit_state(call.id, run, CallState::Finished)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.call_count, 1);
    let second = repo
        .record_exit_state(call.id, run, CallState::Error)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.call_count, 0);
    assert_eq!(
        second.call_exit_states,
        vec![CallState::Finished, CallState::Error]
    );
    assert_eq!(second.last_run, Some(at("2024-01-01T00:00:00Z")));
    assert_eq!(second.next_run, Some(at("2024-01-01T01:00:00Z")));

    // 运行组结束后迟到的退出被忽略
    assert!(repo
        .record_exit_state(call.id, run, CallState::Finished)
        .await
        .unwrap()
        .is_none());
    assert!(repo
        .record_exit_state(Uuid::new_v4(), run, CallState::Finished)
        .await
        .unwrap()
        .is_none());

    assert_eq!(repo.decrement_remaining_runs(call.id).await.unwrap(), Some(1));
    assert_eq!(repo.decrement_remaining_runs(call.id).await.unwrap(), Some(0));
    assert_eq!(repo.decrement_remaining_runs(call.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_failure_counters_and_threshold() {
    let repo = ScheduledCallRepositoryImpl::new(create_test_db().await);
    let call = repo
        .create(&hourly(None, ScheduleOptions::default().with_failure_threshold(2)))
        .await
        .unwrap();

    repo.increment_failures(call.id).await.unwrap();
    assert!(!repo.disable_if_threshold_reached(call.id).await.unwrap());
    repo.increment_failures(call.id).await.unwrap();
    assert!(repo.disable_if_threshold_reached(call.id).await.unwrap());
    // 已禁用
    assert!(!repo.disable_if_threshold_reached(call.id).await.unwrap());

    let stored = repo.find_by_id(call.id).await.unwrap().unwrap();
    assert!(!stored.enabled);
    assert_eq!(stored.consecutive_failures, 2);

    repo.reset_failures(call.id).await.unwrap();
    assert!(repo.set_enabled(call.id, true).await.unwrap());
    let stored = repo.find_by_id(call.id).await.unwrap().unwrap();
    assert!(stored.enabled);
    assert_eq!(stored.consecutive_failures, 0);
    assert!(!repo.set_enabled(Uuid::new_v4(), true).await.unwrap());
}

#[tokio::test]
async fn test_apply_changes_writes_only_given_columns() {
    let repo = ScheduledCallRepositoryImpl::new(create_test_db().await);
    let call = repo
        .create(&hourly(Some(5), ScheduleOptions::default().with_failure_threshold(3)))
        .await
        .unwrap();
    repo.mark_dispatched(call.id, at("2024-01-01T00:00:00Z"), Some(at("2024-01-01T01:00:00Z")), 2)
        .await
        .unwrap();
    repo.increment_failures(call.id).await.unwrap();
    repo.decrement_remaining_runs(call.id).await.unwrap();

    let updated = repo
        .apply_changes(
            call.id,
            &ScheduleChanges {
                failure_threshold: Some(None),
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.failure_threshold, None);
    assert!(!updated.enabled);
    assert_eq!(updated.remaining_runs, Some(4));
    assert_eq!(updated.next_run, Some(at("2024-01-01T01:00:00Z")));
    assert_eq!(updated.first_run, at("2024-01-01T00:00:00Z"));
    assert_eq!(updated.call_count, 2);
    assert_eq!(updated.consecutive_failures, 1);
    assert_eq!(updated.last_run, Some(at("2024-01-01T00:00:00Z")));
    assert_eq!(updated.schedule, call.schedule);

    let rescheduled = repo
        .apply_changes(
            call.id,
            &ScheduleChanges {
                reschedule: Some(Reschedule {
                    schedule: "R3/2024-02-01T00:00:00Z/PT2H".to_string(),
                    first_run: at("2024-02-01T00:00:00Z"),
                }),
                remaining_runs: Some(Some(3)),
                tags: Some(vec!["nightly".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(rescheduled.schedule, "R3/2024-02-01T00:00:00Z/PT2H");
    assert_eq!(rescheduled.first_run, at("2024-02-01T00:00:00Z"));
    assert_eq!(rescheduled.next_run, Some(at("2024-02-01T00:00:00Z")));
    assert_eq!(rescheduled.remaining_runs, Some(3));
    assert_eq!(rescheduled.tags, vec!["nightly".to_string()]);
    assert!(!rescheduled.enabled);
    assert_eq!(rescheduled.call_count, 2);

    assert!(repo
        .apply_changes(Uuid::new_v4(), &ScheduleChanges::default())
        .await
        .is_err());

    repo.reset_call_count(call.id).await.unwrap();
    assert_eq!(
        repo.find_by_id(call.id).await.unwrap().unwrap().call_count,
        0
    );
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{create_test_app, eventually};
use dispatchrs::domain::models::call::{CallRequest, CallState};
use dispatchrs::domain::models::resource::{CallResponse, Operation, ResourceRequirement};
use dispatchrs::utils::errors::ServiceError;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_call_without_resources_is_accepted_and_finishes() {
    let app = create_test_app().await;

    let conflicts = app.coordinator.find_conflicts(&[]).await.unwrap();
    assert_eq!(conflicts.response, CallResponse::Accepted);
    assert!(conflicts.blocking_task_ids.is_empty());
    assert!(conflicts.reasons.is_empty());

    let report = app
        .coordinator
        .execute_call_synchronously(CallRequest::new("ok", json!({"n": 42})), None)
        .await
        .unwrap();

    assert_eq!(report.response, CallResponse::Accepted);
    assert_eq!(report.state, CallState::Finished);
    assert_eq!(report.result, Some(json!({"n": 42})));
    assert!(report.start_time.is_some());
    assert!(report.finish_time.is_some());
}

#[tokio::test]
async fn test_update_in_flight_postpones_delete_until_released() {
    let app = create_test_app().await;

    let blocker = app
        .coordinator
        .execute_call(CallRequest::new("blocked", json!({})).with_resource(
            "repository",
            "repo-1",
            Operation::Update,
        ))
        .await
        .unwrap();
    assert_eq!(blocker.response, CallResponse::Accepted);

    let delete = vec![ResourceRequirement::new("repository", "repo-1", Operation::Delete)];
    let conflicts = app.coordinator.find_conflicts(&delete).await.unwrap();
    assert_eq!(conflicts.response, CallResponse::Postponed);
    assert!(conflicts.blocking_task_ids.contains(&blocker.task_id));

    let postponed = app
        .coordinator
        .execute_call(CallRequest::new("ok", json!({})).with_resources(delete.clone()))
        .await
        .unwrap();
    assert_eq!(postponed.response, CallResponse::Postponed);
    assert_eq!(postponed.state, CallState::Waiting);
    assert_eq!(postponed.blocking_tasks, vec![blocker.task_id]);
    assert!(app
        .coordinator
        .find_task_resources(postponed.task_id)
        .await
        .unwrap()
        .is_empty());

    app.release(1);
    let finished = app
        .coordinator
        .wait_for_task(blocker.task_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(finished.state, CallState::Finished);
    assert_eq!(finished.result, Some(json!("released")));

    let conflicts = app.coordinator.find_conflicts(&delete).await.unwrap();
    assert_eq!(conflicts.response, CallResponse::Accepted);
}

#[tokio::test]
async fn test_delete_in_flight_rejects_update_despite_other_resources() {
    let app = create_test_app().await;

    let deleter = app
        .coordinator
        .execute_call(CallRequest::new("blocked", json!({})).with_resource(
            "content_source",
            "cds-1",
            Operation::Delete,
        ))
        .await
        .unwrap();
    assert_eq!(deleter.response, CallResponse::Accepted);

    let request = CallRequest::new("ok", json!({}))
        .with_resource("content_source", "cds-1", Operation::Update)
        .with_resource("repository", "repo-x", Operation::Read);
    let report = app.coordinator.execute_call(request).await.unwrap();

    assert_eq!(report.response, CallResponse::Rejected);
    assert_eq!(report.state, CallState::Error);
    assert_eq!(report.blocking_tasks, vec![deleter.task_id]);
    assert_eq!(report.reasons.len(), 1);
    assert_eq!(report.reasons[0].resource_id, "cds-1");
    assert_eq!(report.reasons[0].operation, Operation::Delete);
    assert!(app
        .coordinator
        .find_task_resources(report.task_id)
        .await
        .unwrap()
        .is_empty());

    let stored = app.coordinator.get_call_report(report.task_id).await.unwrap();
    assert_eq!(stored.response, CallResponse::Rejected);
    assert!(stored.finish_time.is_some());

    app.release(1);
}

#[tokio::test]
async fn test_wait_for_task_times_out_without_cancelling() {
    let app = create_test_app().await;

    let report = app
        .coordinator
        .execute_call(CallRequest::new("blocked", json!({})))
        .await
        .unwrap();

    let err = app
        .coordinator
        .wait_for_task(report.task_id, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::OperationTimedOut { task_id, .. } if task_id == report.task_id
    ));

    app.release(1);
    let finished = app
        .coordinator
        .wait_for_task(report.task_id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(finished.state, CallState::Finished);
}

#[tokio::test]
async fn test_synchronous_call_times_out() {
    let app = create_test_app().await;

    let err = app
        .coordinator
        .execute_call_synchronously(
            CallRequest::new("blocked", json!({})),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OperationTimedOut { .. }));

    app.release(1);
}

#[tokio::test]
async fn test_reservations_released_when_handler_fails_or_panics() {
    let app = create_test_app().await;

    for task_type in ["fail", "panic"] {
        let report = app
            .coordinator
            .execute_call_synchronously(
                CallRequest::new(task_type, json!({})).with_resource(
                    "repository",
                    "repo-1",
                    Operation::Update,
                ),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.state, CallState::Error, "{}", task_type);
        assert!(report.error.is_some());
        assert!(app
            .coordinator
            .find_task_resources(report.task_id)
            .await
            .unwrap()
            .is_empty());
    }

    // 没有遗留的占用，独占操作可以直接通过
    let conflicts = app
        .coordinator
        .find_conflicts(&[ResourceRequirement::new("repository", "repo-1", Operation::Delete)])
        .await
        .unwrap();
    assert_eq!(conflicts.response, CallResponse::Accepted);
}

#[tokio::test]
async fn test_panicking_handler_reports_message() {
    let app = create_test_app().await;

    let report = app
        .coordinator
        .execute_call_synchronously(CallRequest::new("panic", json!({})), None)
        .await
        .unwrap();

    assert_eq!(report.state, CallState::Error);
    assert!(report.error.unwrap().contains("handler exploded"));
}

#[tokio::test]
async fn test_unknown_task_type_is_refused_and_released() {
    let app = create_test_app().await;

    let report = app
        .coordinator
        .execute_call(CallRequest::new("missing", json!({})).with_resource(
            "repository",
            "repo-1",
            Operation::Read,
        ))
        .await
        .unwrap();

    assert_eq!(report.response, CallResponse::Accepted);
    assert_eq!(report.state, CallState::Error);
    assert!(report.error.unwrap().contains("missing"));
    assert!(app
        .coordinator
        .find_task_resources(report.task_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_multiple_calls_share_group_and_finish() {
    let app = create_test_app().await;

    let reports = app
        .coordinator
        .execute_multiple_calls(
            vec![
                CallRequest::new("ok", json!(1)),
                CallRequest::new("fail", json!(2)),
            ],
            Vec::new(),
        )
        .await
        .unwrap();
    let group_id = reports[0].group_id.unwrap();
    assert_eq!(reports[1].group_id, Some(group_id));

    let coordinator = &app.coordinator;
    eventually("both calls to finish", move || async move {
        coordinator
            .find_call_reports_by_group(group_id)
            .await
            .unwrap()
            .iter()
            .all(|r| r.is_terminal())
    })
    .await;

    let mut states: Vec<CallState> = app
        .coordinator
        .find_call_reports_by_group(group_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.state)
        .collect();
    states.sort_by_key(|s| s.to_string());
    assert_eq!(states, vec![CallState::Error, CallState::Finished]);
}

#[tokio::test]
async fn test_missing_task_is_reported() {
    let app = create_test_app().await;

    let err = app
        .coordinator
        .get_call_report(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingResource { ref resource_type, .. } if resource_type == "task"));

    let err = app
        .coordinator
        .wait_for_task(Uuid::new_v4(), Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingResource { .. }));
}

#[tokio::test]
async fn test_manual_release_frees_reservations() {
    let app = create_test_app().await;

    let report = app
        .coordinator
        .execute_call(CallRequest::new("blocked", json!({})).with_resource(
            "repository",
            "repo-2",
            Operation::Create,
        ))
        .await
        .unwrap();
    assert_eq!(
        app.coordinator
            .find_task_resources(report.task_id)
            .await
            .unwrap()
            .len(),
        1
    );

    assert_eq!(app.coordinator.release_reservations(report.task_id).await.unwrap(), 1);
    assert!(app
        .coordinator
        .find_task_resources(report.task_id)
        .await
        .unwrap()
        .is_empty());

    app.release(1);
}

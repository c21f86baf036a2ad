// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dispatchrs::domain::models::call::{CallRequest, Itinerary};
use dispatchrs::domain::models::scheduled_call::{ScheduleOptions, ScheduledCall};
use dispatchrs::domain::services::recurrence::{calculate_first_run, calculate_next_run};
use serde_json::json;

fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn scheduled(schedule: &str, now: DateTime<Utc>) -> ScheduledCall {
    let first = calculate_first_run(schedule, now).unwrap().unwrap();
    ScheduledCall::new(
        &Itinerary::from(CallRequest::new("sync", json!({}))),
        schedule,
        first.first_run,
        first.run_count.map(|n| n as i32),
        &ScheduleOptions::default(),
    )
    .unwrap()
}

/// 模拟一次运行：记录运行时间并扣减剩余次数
fn simulate_run(call: &mut ScheduledCall) {
    call.last_run = call.next_run;
    call.remaining_runs = call.remaining_runs.map(|n| n - 1);
}

#[test]
fn test_single_run_schedule_has_no_next_run_after_running() {
    let now = utc("2023-12-01T00:00:00Z");
    let mut call = scheduled("R1/2024-01-01T00:00:00Z/P1D", now);

    assert_eq!(call.first_run, utc("2024-01-01T00:00:00Z"));
    assert_eq!(call.remaining_runs, Some(1));
    assert_eq!(
        calculate_next_run(&call, now).unwrap(),
        Some(utc("2024-01-01T00:00:00Z"))
    );

    simulate_run(&mut call);
    assert_eq!(
        calculate_next_run(&call, utc("2024-01-01T00:00:00Z")).unwrap(),
        None
    );
}

#[test]
fn test_bounded_schedule_counts_down() {
    let now = utc("2023-12-01T00:00:00Z");
    let mut call = scheduled("R3/2024-01-01T00:00:00Z/PT1H", now);

    let mut runs = Vec::new();
    let mut clock = utc("2024-01-01T00:00:00Z");
    while let Some(next) = calculate_next_run(&call, clock).unwrap() {
        runs.push(next);
        call.next_run = Some(next);
        simulate_run(&mut call);
        clock = next;
    }

    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0], utc("2024-01-01T00:00:00Z"));
}

#[test]
fn test_past_start_is_moved_forward() {
    let now = utc("2024-03-10T10:15:00Z");
    let call = scheduled("R/2024-01-01T00:00:00Z/P1D", now);
    assert_eq!(call.first_run, utc("2024-03-11T00:00:00Z"));
    assert_eq!(call.remaining_runs, None);
}

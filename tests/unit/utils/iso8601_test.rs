// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dispatchrs::utils::iso8601::{parse_datetime, parse_repeating_interval, Iso8601Error, IsoDuration};

fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

#[test]
fn test_start_time_formats() {
    assert_eq!(
        parse_datetime("2024-01-01T08:00:00+08:00").unwrap(),
        utc("2024-01-01T00:00:00Z")
    );
    assert_eq!(
        parse_datetime("2024-01-01T00:00:00.250").unwrap(),
        utc("2024-01-01T00:00:00.250Z")
    );
    assert_eq!(parse_datetime("2024-01-01").unwrap(), utc("2024-01-01T00:00:00Z"));
    assert!(matches!(
        parse_datetime("yesterday"),
        Err(Iso8601Error::InvalidDateTime(_))
    ));
}

#[test]
fn test_fractional_and_week_durations() {
    let duration = IsoDuration::parse("P1W").unwrap();
    assert_eq!(duration.weeks, 1);
    assert_eq!(
        duration.add_to(utc("2024-01-01T00:00:00Z")),
        Some(utc("2024-01-08T00:00:00Z"))
    );

    let duration = IsoDuration::parse("PT1.5S").unwrap();
    assert_eq!(duration.milliseconds, 1500);
    assert_eq!(duration.to_string(), "PT1.5S");

    assert!(IsoDuration::parse("P").is_err());
    assert!(IsoDuration::parse("PT").is_err());
    assert!(IsoDuration::parse("1D").is_err());
}

#[test]
fn test_leap_day_month_arithmetic() {
    let month = IsoDuration::parse("P1M").unwrap();
    assert_eq!(
        month.add_to(utc("2024-01-31T00:00:00Z")),
        Some(utc("2024-02-29T00:00:00Z"))
    );
    let year = IsoDuration::parse("P1Y").unwrap();
    assert_eq!(
        year.add_to(utc("2024-02-29T12:00:00Z")),
        Some(utc("2025-02-28T12:00:00Z"))
    );
}

#[test]
fn test_repeating_interval_shapes() {
    let parsed = parse_repeating_interval("R5/2024-01-01T00:00:00Z/PT30M").unwrap();
    assert_eq!(parsed.run_count, Some(5));
    assert_eq!(parsed.start, Some(utc("2024-01-01T00:00:00Z")));
    assert_eq!(parsed.interval.minutes, 30);

    let parsed = parse_repeating_interval("2024-01-01T00:00:00Z/P1D").unwrap();
    assert_eq!(parsed.run_count, None);

    let parsed = parse_repeating_interval("P1D").unwrap();
    assert_eq!(parsed.start, None);
    assert_eq!(parsed.run_count, None);

    assert!(matches!(
        parse_repeating_interval("Rx/P1D"),
        Err(Iso8601Error::InvalidRunCount(_))
    ));
    assert!(parse_repeating_interval("R/2024-01-01T00:00:00Z/P1D/P1D").is_err());
    assert!(parse_repeating_interval("").is_err());
}

//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

fn step_seconds(step: Duration) -> i64 {
    step.as_secs().max(1) as i64
}

/// Floor an instant to the nearest step boundary (epoch aligned, UTC).
pub fn align_down(instant: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_s = step_seconds(step);
    let aligned = instant.timestamp().div_euclid(step_s) * step_s;
    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(instant)
}

/// The first step boundary strictly after `instant`.
pub fn next_boundary(instant: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_s = step_seconds(step);
    let next = (instant.timestamp().div_euclid(step_s) + 1) * step_s;
    DateTime::<Utc>::from_timestamp(next, 0).unwrap_or(instant)
}

/// Calendar day (UTC) that owns a tick.
pub fn day_key(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// 12:00 UTC of the given day, used to timestamp daily aggregates.
pub fn noon_utc(day: NaiveDate) -> DateTime<Utc> {
    (day.and_time(NaiveTime::default()) + chrono::Duration::hours(12)).and_utc()
}

/// Hours represented by one step, used to integrate power into energy.
pub fn step_hours(step: Duration) -> f64 {
    step.as_secs_f64() / 3600.0
}

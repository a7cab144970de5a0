//! ---
//! ems_section: "11-simulation-test-harness"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Recorded plant data sources and time-grid alignment."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use pvmon_common::time::align_down;
use pvmon_common::Sample;

/// Step assumed when the recorded timestamps do not reveal one.
pub const DEFAULT_STEP: Duration = Duration::from_secs(15 * 60);

/// Number of leading timestamps inspected when inferring the step.
const STEP_PROBE: usize = 10;

/// Calendar position of a tick within a year. The year is deliberately absent
/// so one recorded year can be replayed against any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplayKey {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl ReplayKey {
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            month: instant.month(),
            day: instant.day(),
            hour: instant.hour(),
            minute: instant.minute(),
        }
    }

    pub fn is_leap_day(&self) -> bool {
        self.month == 2 && self.day == 29
    }
}

impl std::fmt::Display for ReplayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}-{:02} {:02}:{:02}",
            self.month, self.day, self.hour, self.minute
        )
    }
}

/// Maps wall-clock instants onto recorded samples.
///
/// Built once from the recorded rows and read-only afterwards. When several
/// rows share a [`ReplayKey`] (multi-year recordings) the first one in input
/// order is kept.
#[derive(Debug, Clone)]
pub struct TimeGridAligner {
    step: Duration,
    rows: HashMap<ReplayKey, Sample>,
}

impl TimeGridAligner {
    pub fn new(samples: Vec<Sample>) -> Self {
        let step = infer_step(samples.iter().map(|sample| sample.timestamp));
        let mut rows = HashMap::with_capacity(samples.len());
        for sample in samples {
            rows.entry(ReplayKey::of(sample.timestamp)).or_insert(sample);
        }
        Self { step, rows }
    }

    /// Native sampling interval of the recording.
    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, key: &ReplayKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Floor an instant to the step grid.
    pub fn snap(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        align_down(instant, self.step)
    }

    /// Look up the recorded row for an aligned instant. The returned sample is
    /// stamped with `aligned`, not with the historical row's timestamp.
    pub fn resolve(&self, aligned: DateTime<Utc>) -> Option<Sample> {
        self.rows.get(&ReplayKey::of(aligned)).map(|row| Sample {
            timestamp: aligned,
            ..row.clone()
        })
    }

    /// Resolve every aligned step from `start` (floored) through `end`
    /// inclusive, eliding gaps. Reversed bounds are swapped.
    pub fn series_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Sample> {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let step = match chrono::Duration::from_std(self.step) {
            Ok(step) if step > chrono::Duration::zero() => step,
            _ => return Vec::new(),
        };
        let mut out = Vec::new();
        let mut cursor = self.snap(start);
        while cursor <= end {
            if let Some(sample) = self.resolve(cursor) {
                out.push(sample);
            }
            cursor += step;
        }
        out
    }
}

/// Smallest positive whole-minute gap between the earliest timestamp and one
/// of the next few distinct timestamps, or [`DEFAULT_STEP`].
pub fn infer_step<I>(timestamps: I) -> Duration
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut sorted: Vec<DateTime<Utc>> = timestamps.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    let Some(first) = sorted.first().copied() else {
        return DEFAULT_STEP;
    };
    sorted
        .iter()
        .take(STEP_PROBE)
        .skip(1)
        .map(|ts| (*ts - first).num_minutes())
        .find(|minutes| *minutes > 0)
        .map(|minutes| Duration::from_secs(minutes as u64 * 60))
        .unwrap_or(DEFAULT_STEP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_at(ts: DateTime<Utc>, poa: f64) -> Sample {
        Sample {
            timestamp: ts,
            poa_wm2: poa,
            cell_temp_c: 30.0,
            module_temp_c: None,
            inverters_kw: vec![1.0, 2.0],
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn infers_step_from_first_positive_gap() {
        let stamps = vec![
            utc(2023, 5, 1, 10, 10),
            utc(2023, 5, 1, 10, 0),
            utc(2023, 5, 1, 10, 0),
            utc(2023, 5, 1, 10, 5),
        ];
        assert_eq!(infer_step(stamps), Duration::from_secs(300));
    }

    #[test]
    fn defaults_to_fifteen_minutes() {
        assert_eq!(infer_step(Vec::new()), DEFAULT_STEP);
        assert_eq!(infer_step(vec![utc(2023, 5, 1, 10, 0)]), DEFAULT_STEP);
    }

    #[test]
    fn resolve_ignores_year_and_restamps_sample() {
        let aligner = TimeGridAligner::new(vec![
            sample_at(utc(2021, 7, 4, 12, 0), 800.0),
            sample_at(utc(2021, 7, 4, 12, 15), 810.0),
        ]);
        let target = utc(2030, 7, 4, 12, 15);
        let resolved = aligner.resolve(target).unwrap();
        assert_eq!(resolved.timestamp, target);
        assert_eq!(resolved.poa_wm2, 810.0);
    }

    #[test]
    fn missing_minute_is_absent_in_any_year() {
        let aligner = TimeGridAligner::new(vec![
            sample_at(utc(2021, 7, 4, 12, 0), 800.0),
            sample_at(utc(2021, 7, 4, 12, 15), 810.0),
        ]);
        for year in [2021, 2024, 2099] {
            assert!(aligner.resolve(utc(year, 7, 4, 12, 30)).is_none());
        }
    }

    #[test]
    fn leap_day_is_absent_against_non_leap_recording() {
        let aligner = TimeGridAligner::new(vec![
            sample_at(utc(2023, 2, 28, 23, 45), 0.0),
            sample_at(utc(2023, 3, 1, 0, 0), 0.0),
        ]);
        assert!(aligner.resolve(utc(2024, 2, 29, 12, 0)).is_none());
        assert!(aligner.resolve(utc(2024, 3, 1, 0, 0)).is_some());
    }

    #[test]
    fn leap_day_recording_is_only_reached_in_leap_years() {
        let aligner = TimeGridAligner::new(vec![
            sample_at(utc(2024, 2, 29, 12, 0), 500.0),
            sample_at(utc(2024, 2, 29, 12, 15), 520.0),
        ]);
        let key = ReplayKey::of(utc(2024, 2, 29, 12, 0));
        assert!(key.is_leap_day());
        assert!(aligner.contains(&key));
        assert_eq!(aligner.resolve(utc(2028, 2, 29, 12, 0)).unwrap().poa_wm2, 500.0);
        assert!(aligner.resolve(utc(2025, 3, 1, 12, 0)).is_none());
    }

    #[test]
    fn first_row_wins_for_duplicate_keys() {
        let aligner = TimeGridAligner::new(vec![
            sample_at(utc(2021, 1, 1, 9, 0), 100.0),
            sample_at(utc(2022, 1, 1, 9, 0), 999.0),
        ]);
        assert_eq!(aligner.len(), 1);
        assert_eq!(aligner.resolve(utc(2025, 1, 1, 9, 0)).unwrap().poa_wm2, 100.0);
    }

    #[test]
    fn series_between_is_end_inclusive_and_swaps_bounds() {
        let recorded: Vec<_> = (0..8)
            .map(|i| sample_at(utc(2021, 6, 1, 10, 0) + chrono::Duration::minutes(15 * i), i as f64))
            .filter(|sample| sample.poa_wm2 != 3.0)
            .collect();
        let aligner = TimeGridAligner::new(recorded);

        let start = utc(2025, 6, 1, 10, 7);
        let end = utc(2025, 6, 1, 11, 0);
        let forward = aligner.series_between(start, end);
        let poa: Vec<f64> = forward.iter().map(|s| s.poa_wm2).collect();
        assert_eq!(poa, vec![0.0, 1.0, 2.0, 4.0]);
        assert_eq!(forward.last().unwrap().timestamp, end);

        let reversed = aligner.series_between(end, start);
        assert_eq!(reversed, forward);
    }

    #[test]
    fn replay_key_formats_like_a_calendar_position() {
        assert_eq!(ReplayKey::of(utc(2024, 3, 9, 7, 5)).to_string(), "03-09 07:05");
    }
}

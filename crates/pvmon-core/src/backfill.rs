//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pvmon_alarms::AlarmEngine;
use pvmon_metrics::{MetricLine, MetricsSink};
use pvmon_rt::ShutdownListener;
use pvmon_source::TimeSeriesSource;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::emission::{daily_pr_line, publish_chunked, PublishOutcome, TickLines};
use crate::energy::EnergyTracker;
use crate::observation::ObservationBuilder;

/// Phases of a backfill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackfillPhase {
    Init,
    Iterating,
    Flushing,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub ticks: usize,
    pub days: usize,
    pub lines_sent: usize,
    pub lines_failed: usize,
    pub cancelled: bool,
}

/// One bounded historical pass over `[now - horizon, now]`.
///
/// Owns its own [`AlarmEngine`]; live alarm state is never touched.
pub struct BackfillRunner {
    source: Arc<dyn TimeSeriesSource>,
    sink: Arc<dyn MetricsSink>,
    builder: ObservationBuilder,
    alarms: AlarmEngine,
    horizon: Duration,
    batch_size: usize,
    phase: BackfillPhase,
}

impl BackfillRunner {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        sink: Arc<dyn MetricsSink>,
        builder: ObservationBuilder,
        alarms: AlarmEngine,
        horizon_days: u32,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            sink,
            builder,
            alarms,
            horizon: Duration::days(i64::from(horizon_days)),
            batch_size,
            phase: BackfillPhase::Init,
        }
    }

    pub fn phase(&self) -> BackfillPhase {
        self.phase
    }

    pub fn alarms(&self) -> &AlarmEngine {
        &self.alarms
    }

    fn enter(&mut self, phase: BackfillPhase) {
        debug!(from = ?self.phase, to = ?phase, "backfill phase");
        self.phase = phase;
    }

    pub async fn run(&mut self, now: DateTime<Utc>, shutdown: &ShutdownListener) -> BackfillReport {
        let Some(start) = now.checked_sub_signed(self.horizon) else {
            error!(end = %now, horizon_days = self.horizon.num_days(), "backfill horizon out of range; skipping pass");
            self.enter(BackfillPhase::Done);
            return BackfillReport {
                end: Some(now),
                ..BackfillReport::default()
            };
        };
        let mut report = BackfillReport {
            start: Some(start),
            end: Some(now),
            ..BackfillReport::default()
        };
        info!(start = %start, end = %now, derate = self.builder.derate(), "backfill started");

        self.enter(BackfillPhase::Iterating);
        let series = self.source.series_between(start, now);
        let mut tracker = EnergyTracker::new(self.source.step());
        let mut telemetry = TickLines::default();
        let mut alarm_lines: Vec<MetricLine> = Vec::new();
        let mut daily: Vec<MetricLine> = Vec::new();
        let capacity = self.builder.nominal_capacity_kw();

        for sample in &series {
            if shutdown.is_triggered() {
                warn!(processed = report.ticks, "backfill interrupted by shutdown");
                report.cancelled = true;
                self.enter(BackfillPhase::Done);
                return report;
            }
            let observation = self.builder.build(sample);
            alarm_lines.extend(self.alarms.step(&observation));
            let (energy, completed) = tracker.record(&observation);
            if let Some(day) = completed {
                report.days += 1;
                if let Some(pr) = day.performance_ratio(capacity) {
                    daily.push(daily_pr_line(day.day, pr));
                }
            }
            TickLines::render(&observation, &energy).extend_into(&mut telemetry);
            report.ticks += 1;
        }
        if let Some(day) = tracker.finish() {
            report.days += 1;
            if let Some(pr) = day.performance_ratio(capacity) {
                daily.push(daily_pr_line(day.day, pr));
            }
        }

        self.enter(BackfillPhase::Flushing);
        let mut outcome = PublishOutcome::default();
        let groups = telemetry
            .into_groups()
            .into_iter()
            .chain([("alarms", alarm_lines), ("pr_daily", daily)]);
        for (group, lines) in groups {
            if lines.is_empty() {
                continue;
            }
            outcome.absorb(
                publish_chunked(self.sink.as_ref(), group, &lines, self.batch_size, shutdown).await,
            );
            if outcome.cancelled {
                warn!(group, "backfill flush interrupted by shutdown");
                break;
            }
        }
        report.lines_sent = outcome.sent;
        report.lines_failed = outcome.failed;
        report.cancelled = outcome.cancelled;

        self.enter(BackfillPhase::Done);
        info!(
            ticks = report.ticks,
            days = report.days,
            lines_sent = report.lines_sent,
            lines_failed = report.lines_failed,
            cancelled = report.cancelled,
            "backfill finished"
        );
        report
    }
}

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
use pvmon_calc_engine::DerateCalibrator;
use pvmon_metrics::MetricsSink;
use pvmon_rt::{ShutdownListener, Ticker};
use pvmon_source::TimeSeriesSource;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::emission::{daily_pr_line, publish_chunked, PublishOutcome, TickLines};
use crate::energy::{EnergyLedger, EnergyTracker};
use crate::observation::ObservationBuilder;

/// Lifecycle of the realtime loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RealtimeState {
    Init,
    WaitTick,
    Process,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RealtimeReport {
    pub ticks: usize,
    pub skipped: usize,
    pub days: usize,
    pub lines_sent: usize,
    pub lines_failed: usize,
    pub recalibrations: usize,
    pub energy: EnergyLedger,
    pub cancelled: bool,
}

struct Recalibration {
    calibrator: DerateCalibrator,
    every: Duration,
    last: Option<DateTime<Utc>>,
}

/// Follows the wall clock, one observation per tick, until shutdown or the
/// ticker is exhausted.
pub struct RealtimeRunner {
    source: Arc<dyn TimeSeriesSource>,
    sink: Arc<dyn MetricsSink>,
    builder: ObservationBuilder,
    alarms: AlarmEngine,
    tracker: EnergyTracker,
    batch_size: usize,
    recalibration: Option<Recalibration>,
    last_timestamp: Option<DateTime<Utc>>,
    state: RealtimeState,
}

impl RealtimeRunner {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        sink: Arc<dyn MetricsSink>,
        builder: ObservationBuilder,
        alarms: AlarmEngine,
        batch_size: usize,
    ) -> Self {
        let tracker = EnergyTracker::new(source.step());
        Self {
            source,
            sink,
            builder,
            alarms,
            tracker,
            batch_size,
            recalibration: None,
            last_timestamp: None,
            state: RealtimeState::Init,
        }
    }

    /// Re-fit the derate whenever `every` has elapsed on the tick clock.
    /// A failed fit keeps the current derate.
    pub fn with_recalibration(mut self, calibrator: DerateCalibrator, every: std::time::Duration) -> Self {
        match Duration::from_std(every) {
            Ok(every) => {
                self.recalibration = Some(Recalibration {
                    calibrator,
                    every,
                    last: None,
                });
            }
            Err(err) => warn!(error = %err, "recalibration interval out of range; disabled"),
        }
        self
    }

    pub fn state(&self) -> RealtimeState {
        self.state
    }

    pub fn derate(&self) -> f64 {
        self.builder.derate()
    }

    pub fn alarms(&self) -> &AlarmEngine {
        &self.alarms
    }

    pub fn ledger(&self) -> EnergyLedger {
        self.tracker.ledger()
    }

    fn enter(&mut self, state: RealtimeState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "realtime state");
            self.state = state;
        }
    }

    pub async fn run<T>(&mut self, mut ticker: T, mut shutdown: ShutdownListener) -> RealtimeReport
    where
        T: Ticker,
    {
        let mut report = RealtimeReport::default();
        info!(derate = self.builder.derate(), step_secs = self.source.step().as_secs(), "realtime loop started");

        loop {
            self.enter(RealtimeState::WaitTick);
            if shutdown.is_triggered() {
                report.cancelled = true;
                break;
            }
            let tick = tokio::select! {
                _ = shutdown.triggered() => {
                    report.cancelled = true;
                    break;
                }
                tick = ticker.next_tick() => tick,
            };
            let Some(now) = tick else {
                debug!("ticker exhausted");
                break;
            };

            self.enter(RealtimeState::Process);
            let outcome = self.process(now, &shutdown, &mut report).await;
            report.lines_sent += outcome.sent;
            report.lines_failed += outcome.failed;
            if outcome.cancelled {
                report.cancelled = true;
                break;
            }
        }

        self.enter(RealtimeState::Stopped);
        report.energy = self.tracker.ledger();
        info!(
            ticks = report.ticks,
            skipped = report.skipped,
            lines_sent = report.lines_sent,
            lines_failed = report.lines_failed,
            real_kwh = report.energy.real_kwh,
            ideal_kwh = report.energy.ideal_kwh,
            cancelled = report.cancelled,
            "realtime loop stopped"
        );
        report
    }

    async fn process(
        &mut self,
        now: DateTime<Utc>,
        shutdown: &ShutdownListener,
        report: &mut RealtimeReport,
    ) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let Some(sample) = self.source.point_at(now) else {
            debug!(tick = %now, "no sample for tick");
            report.skipped += 1;
            return outcome;
        };
        if self.last_timestamp == Some(sample.timestamp) {
            debug!(tick = %now, timestamp = %sample.timestamp, "duplicate tick skipped");
            report.skipped += 1;
            return outcome;
        }
        self.last_timestamp = Some(sample.timestamp);
        self.maybe_recalibrate(now, report);

        let observation = self.builder.build(&sample);
        let (energy, completed) = self.tracker.record(&observation);
        report.ticks += 1;

        for (group, lines) in TickLines::render(&observation, &energy).into_groups() {
            outcome.absorb(publish_chunked(self.sink.as_ref(), group, &lines, self.batch_size, shutdown).await);
            if outcome.cancelled {
                return outcome;
            }
        }

        let alarm_lines = self.alarms.step(&observation);
        outcome.absorb(publish_chunked(self.sink.as_ref(), "alarms", &alarm_lines, self.batch_size, shutdown).await);
        if outcome.cancelled {
            return outcome;
        }

        if let Some(day) = completed {
            report.days += 1;
            match day.performance_ratio(self.builder.nominal_capacity_kw()) {
                Some(pr) => {
                    info!(day = %day.day, pr, energy_kwh = day.energy_kwh, "daily performance ratio");
                    let line = [daily_pr_line(day.day, pr)];
                    outcome.absorb(publish_chunked(self.sink.as_ref(), "pr_daily", &line, self.batch_size, shutdown).await);
                }
                None => debug!(day = %day.day, "no daylight irradiation; daily ratio skipped"),
            }
        }
        outcome
    }

    fn maybe_recalibrate(&mut self, now: DateTime<Utc>, report: &mut RealtimeReport) {
        let Some(recal) = self.recalibration.as_mut() else {
            return;
        };
        let last = *recal.last.get_or_insert(now);
        if now - last < recal.every {
            return;
        }
        recal.last = Some(now);
        match recal.calibrator.calibrate(self.source.as_ref(), now) {
            Ok(calibration) => {
                report.recalibrations += 1;
                info!(
                    previous = self.builder.derate(),
                    derate = calibration.derate.value(),
                    r2 = calibration.metrics.r2,
                    "derate recalibrated"
                );
                self.builder.set_derate(calibration.derate.value());
            }
            Err(err) => warn!(error = %err, derate = self.builder.derate(), "recalibration failed; keeping derate"),
        }
    }
}

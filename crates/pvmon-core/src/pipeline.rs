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

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use pvmon_alarms::AlarmEngine;
use pvmon_calc_engine::{Calibration, DerateCalibrator};
use pvmon_common::AppConfig;
use pvmon_metrics::MetricsSink;
use pvmon_rt::{ShutdownListener, ShutdownTrigger, Ticker};
use pvmon_sim::{ModuleCatalog, PvArray};
use pvmon_source::TimeSeriesSource;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backfill::{BackfillReport, BackfillRunner};
use crate::observation::ObservationBuilder;
use crate::realtime::{RealtimeReport, RealtimeRunner};

/// Wires the configured source, catalog and sink into the two execution
/// units. Each unit gets its own builder and alarm engine.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<AppConfig>,
    source: Arc<dyn TimeSeriesSource>,
    sink: Arc<dyn MetricsSink>,
    catalog: Arc<dyn ModuleCatalog>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("plant", &self.config.plant.name)
            .field("module", &self.config.plant.module)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        config: Arc<AppConfig>,
        source: Arc<dyn TimeSeriesSource>,
        sink: Arc<dyn MetricsSink>,
        catalog: Arc<dyn ModuleCatalog>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            catalog,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Tick spacing of the underlying source.
    pub fn step(&self) -> std::time::Duration {
        self.source.step()
    }

    pub fn array(&self) -> PvArray {
        ObservationBuilder::array_for(&self.config.plant, self.catalog.as_ref())
    }

    pub fn calibrator(&self) -> DerateCalibrator {
        DerateCalibrator::new(
            self.array(),
            self.config.plant.day_threshold_wm2,
            &self.config.calibration,
        )
    }

    /// Fit the derate on the lookback window ending at `now`.
    pub fn calibrate(&self, now: DateTime<Utc>) -> Result<Calibration> {
        self.calibrator()
            .calibrate(self.source.as_ref(), now)
            .context("derate calibration failed")
    }

    /// Derate used for this run: fitted when calibration is enabled, the
    /// configured static value otherwise or when the fit fails.
    pub fn resolve_derate(&self, now: DateTime<Utc>) -> f64 {
        let fallback = self.config.calibration.static_derate;
        if !self.config.calibration.enabled {
            info!(derate = fallback, "calibration disabled; using static derate");
            return fallback;
        }
        match self.calibrate(now) {
            Ok(calibration) => calibration.derate.value(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), derate = fallback, "falling back to static derate");
                fallback
            }
        }
    }

    fn builder(&self, derate: f64) -> ObservationBuilder {
        ObservationBuilder::new(self.array(), derate, &self.config.plant)
    }

    fn alarm_engine(&self) -> AlarmEngine {
        AlarmEngine::from_config(&self.config.alarms, &self.config.plant)
    }

    pub fn backfill_runner(&self, derate: f64) -> BackfillRunner {
        BackfillRunner::new(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            self.builder(derate),
            self.alarm_engine(),
            self.config.backfill.horizon_days,
            self.config.backfill.batch_size,
        )
    }

    pub fn realtime_runner(&self, derate: f64) -> RealtimeRunner {
        let runner = RealtimeRunner::new(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            self.builder(derate),
            self.alarm_engine(),
            self.config.backfill.batch_size,
        );
        match (self.config.calibration.enabled, self.config.calibration.recalibrate_every) {
            (true, Some(every)) => runner.with_recalibration(self.calibrator(), every),
            _ => runner,
        }
    }

    /// Run a single backfill pass in the caller's task.
    pub async fn run_backfill(&self, now: DateTime<Utc>, shutdown: &ShutdownListener) -> BackfillReport {
        let derate = self.resolve_derate(now);
        self.backfill_runner(derate).run(now, shutdown).await
    }

    /// Calibrate once, then spawn the backfill (when enabled) and realtime
    /// units concurrently.
    pub fn start<T>(&self, now: DateTime<Utc>, ticker: T, trigger: ShutdownTrigger) -> PipelineHandle
    where
        T: Ticker + 'static,
    {
        let derate = self.resolve_derate(now);
        info!(
            plant = %self.config.plant.name,
            derate,
            backfill = self.config.backfill.enabled,
            "pipeline starting"
        );

        let backfill = self.config.backfill.enabled.then(|| {
            let mut runner = self.backfill_runner(derate);
            let shutdown = trigger.subscribe();
            tokio::spawn(async move { runner.run(now, &shutdown).await })
        });

        let mut runner = self.realtime_runner(derate);
        let shutdown = trigger.subscribe();
        let realtime = tokio::spawn(async move { runner.run(ticker, shutdown).await });

        PipelineHandle {
            derate,
            trigger,
            backfill,
            realtime,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub derate: f64,
    pub backfill: Option<BackfillReport>,
    pub realtime: RealtimeReport,
}

/// Running pipeline. Dropping the handle leaves the tasks running until the
/// trigger is fired elsewhere.
#[derive(Debug)]
pub struct PipelineHandle {
    derate: f64,
    trigger: ShutdownTrigger,
    backfill: Option<JoinHandle<BackfillReport>>,
    realtime: JoinHandle<RealtimeReport>,
}

impl PipelineHandle {
    pub fn derate(&self) -> f64 {
        self.derate
    }

    pub fn trigger(&self) {
        self.trigger.trigger();
    }

    /// Wait for both units without requesting shutdown.
    pub async fn join(self) -> Result<PipelineReport> {
        let backfill = match self.backfill {
            Some(task) => Some(task.await.map_err(|err| anyhow!("backfill task failed: {err}"))?),
            None => None,
        };
        let realtime = self
            .realtime
            .await
            .map_err(|err| anyhow!("realtime task failed: {err}"))?;
        let report = PipelineReport {
            derate: self.derate,
            backfill,
            realtime,
        };
        info!(
            derate = report.derate,
            realtime_ticks = report.realtime.ticks,
            backfill_ticks = report.backfill.as_ref().map_or(0, |b| b.ticks),
            "pipeline stopped"
        );
        Ok(report)
    }

    /// Request shutdown and wait for both units to drain.
    pub async fn shutdown(self) -> Result<PipelineReport> {
        self.trigger.trigger();
        self.join().await
    }
}

//! ---
//! ems_section: "11-simulation-test-harness"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Recorded plant data sources and time-grid alignment."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use pvmon_common::{Sample, SourceConfig};
use tracing::info;

use crate::aligner::TimeGridAligner;
use crate::errors::Result;
use crate::loader::load_samples;

/// Read-only provider of aligned samples.
///
/// Implementations are immutable after construction and shared between the
/// backfill and realtime units without locking.
pub trait TimeSeriesSource: Send + Sync {
    /// Native sampling step.
    fn step(&self) -> Duration;

    /// Floor `instant` to the step grid.
    fn snap(&self, instant: DateTime<Utc>) -> DateTime<Utc>;

    /// Sample for the tick containing `instant`, or `None` for a data gap.
    fn point_at(&self, instant: DateTime<Utc>) -> Option<Sample>;

    fn point_now(&self) -> Option<Sample> {
        self.point_at(Utc::now())
    }

    /// Present samples for every aligned tick in `[start, end]`.
    fn series_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Sample>;
}

/// Replays a finite recording as an endless feed.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    aligner: TimeGridAligner,
}

impl ReplaySource {
    /// Load the configured CSV and build the replay index.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let samples = load_samples(config)?;
        let source = Self::from_samples(samples);
        info!(
            path = %config.path.display(),
            step_s = source.step().as_secs(),
            keys = source.aligner.len(),
            "replay source ready"
        );
        Ok(source)
    }

    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            aligner: TimeGridAligner::new(samples),
        }
    }

    pub fn aligner(&self) -> &TimeGridAligner {
        &self.aligner
    }
}

impl TimeSeriesSource for ReplaySource {
    fn step(&self) -> Duration {
        self.aligner.step()
    }

    fn snap(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.aligner.snap(instant)
    }

    fn point_at(&self, instant: DateTime<Utc>) -> Option<Sample> {
        self.aligner.resolve(self.aligner.snap(instant))
    }

    fn series_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Sample> {
        self.aligner.series_between(start, end)
    }
}

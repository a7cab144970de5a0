//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Derate calibration by robust regression of real against ideal power."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Duration, Utc};
use pvmon_common::{CalibrationConfig, CalibrationMethod, Sample};
use pvmon_sim::PvArray;
use pvmon_source::TimeSeriesSource;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{CalibrationError, Result};
use crate::regression::{fit_statistics, huber_irls, ols_closed_form, HuberSettings};

/// Scalar efficiency multiplier applied to the ideal power model.
/// Always lies within the bounds it was built with.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct DerateFactor(f64);

impl DerateFactor {
    pub fn clamped(value: f64, min: f64, max: f64) -> Self {
        Self(value.clamp(min, max))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for DerateFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitMetrics {
    pub sse: f64,
    pub rmse: f64,
    pub r2: f64,
    pub mape_pct: f64,
    pub n_points: usize,
    /// OLS-only estimate, clamped, for comparison with the final value.
    pub derate_ols: f64,
    pub derate_final: f64,
    /// IRLS rounds executed; zero when the refinement was skipped.
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub derate: DerateFactor,
    pub metrics: FitMetrics,
}

/// Fits the derate from a window of recorded samples.
#[derive(Debug, Clone)]
pub struct DerateCalibrator {
    array: PvArray,
    day_threshold_wm2: f64,
    method: CalibrationMethod,
    huber: HuberSettings,
    min_derate: f64,
    max_derate: f64,
    lookback: Duration,
}

impl DerateCalibrator {
    pub fn new(array: PvArray, day_threshold_wm2: f64, config: &CalibrationConfig) -> Self {
        Self {
            array,
            day_threshold_wm2,
            method: config.method,
            huber: HuberSettings {
                delta: config.huber_delta_kw,
                max_iterations: config.max_iterations,
                tolerance: config.tolerance,
            },
            min_derate: config.min_derate,
            max_derate: config.max_derate,
            lookback: Duration::days(i64::from(config.lookback_days)),
        }
    }

    /// Pull the lookback window ending at `now` from the source and fit it.
    pub fn calibrate(&self, source: &dyn TimeSeriesSource, now: DateTime<Utc>) -> Result<Calibration> {
        let start = now
            .checked_sub_signed(self.lookback)
            .ok_or(CalibrationError::WindowOutOfRange {
                lookback_days: self.lookback.num_days(),
                end: now,
            })?;
        let window = source.series_between(start, now);
        debug!(start = %start, end = %now, samples = window.len(), "calibration window loaded");
        self.estimate(&window)
    }

    /// Fit the derate on the daylight part of `window`.
    pub fn estimate(&self, window: &[Sample]) -> Result<Calibration> {
        let mut y = Vec::with_capacity(window.len());
        let mut pac = Vec::with_capacity(window.len());
        for sample in window.iter().filter(|s| s.poa_wm2 > self.day_threshold_wm2) {
            let ideal = self
                .array
                .ideal_total_kw(sample.poa_wm2, sample.cell_temp_c, 1.0);
            let real = sample.total_ac_kw();
            if !ideal.is_finite() || !real.is_finite() {
                return Err(CalibrationError::NonFiniteInput {
                    timestamp: sample.timestamp,
                });
            }
            y.push(ideal);
            pac.push(real);
        }
        if y.is_empty() {
            return Err(CalibrationError::InsufficientData {
                threshold_wm2: self.day_threshold_wm2,
            });
        }

        let d_ols = ols_closed_form(&y, &pac);
        let (raw, iterations, converged) = match self.method {
            CalibrationMethod::Ols => (d_ols, 0, true),
            CalibrationMethod::Huber | CalibrationMethod::Both => {
                let fit = huber_irls(&y, &pac, &self.huber, d_ols);
                (fit.estimate, fit.iterations, fit.converged)
            }
        };
        let derate = DerateFactor::clamped(raw, self.min_derate, self.max_derate);
        let stats = fit_statistics(&y, &pac, derate.value());
        let metrics = FitMetrics {
            sse: stats.sse,
            rmse: stats.rmse,
            r2: stats.r2,
            mape_pct: stats.mape_pct,
            n_points: y.len(),
            derate_ols: d_ols.clamp(self.min_derate, self.max_derate),
            derate_final: derate.value(),
            iterations,
            converged,
        };
        info!(
            derate = derate.value(),
            derate_ols = metrics.derate_ols,
            r2 = metrics.r2,
            rmse = metrics.rmse,
            n_points = metrics.n_points,
            method = ?self.method,
            "derate calibrated"
        );
        Ok(Calibration { derate, metrics })
    }
}

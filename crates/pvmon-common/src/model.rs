//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded tick as resolved from the time-series source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    /// Plane-of-array irradiance (W/m²).
    pub poa_wm2: f64,
    pub cell_temp_c: f64,
    #[serde(default)]
    pub module_temp_c: Option<f64>,
    /// Per-inverter AC output (kW), in configured column order.
    pub inverters_kw: Vec<f64>,
}

impl Sample {
    pub fn total_ac_kw(&self) -> f64 {
        self.inverters_kw.iter().sum()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Derived per-tick record consumed by the alarm engine and emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub poa_wm2: f64,
    pub total_ac_kw: f64,
    pub ideal_per_inverter_kw: f64,
    pub ideal_total_kw: f64,
    pub pr_instant: f64,
    pub sunny: bool,
    pub day: bool,
    pub cell_temp_c: f64,
    pub module_temp_c: Option<f64>,
    pub inverters_kw: Vec<f64>,
}

impl Observation {
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

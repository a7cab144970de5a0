//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Derate calibration by robust regression of real against ideal power."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalibrationError>;

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("no samples above {threshold_wm2} W/m² in the calibration window")]
    InsufficientData { threshold_wm2: f64 },
    #[error("calibration window of {lookback_days} days before {end} is out of range")]
    WindowOutOfRange {
        lookback_days: i64,
        end: chrono::DateTime<chrono::Utc>,
    },
    #[error("non-finite value in calibration sample at {timestamp}")]
    NonFiniteInput { timestamp: chrono::DateTime<chrono::Utc> },
}

//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Derate calibration by robust regression of real against ideal power."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
pub mod calibration;
pub mod errors;
pub mod regression;

pub use calibration::{Calibration, DerateCalibrator, DerateFactor, FitMetrics};
pub use errors::{CalibrationError, Result};
pub use regression::{fit_statistics, huber_irls, ols_closed_form, FitStatistics, HuberSettings};

//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Derate calibration by robust regression of real against ideal power."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use pvmon_calc_engine::{CalibrationError, DerateCalibrator};
use pvmon_common::{CalibrationConfig, Sample};
use pvmon_sim::{ModuleCatalog, PvArray, StaticModuleCatalog};
use pvmon_source::ReplaySource;

const MODULE: &str = "Jinko_Solar_Co___Ltd_JKM320PP_72";

fn reference_array() -> PvArray {
    PvArray::new(StaticModuleCatalog::builtin().lookup(MODULE), 50, 3)
}

/// One recorded day at 15 minute steps with a bell-shaped irradiance curve,
/// real power at `factor` times the underated ideal.
fn recorded_day(factor: f64) -> Vec<Sample> {
    let array = reference_array();
    let midnight = Utc.with_ymd_and_hms(2023, 8, 10, 0, 0, 0).unwrap();
    (0..96)
        .map(|i| {
            let hour = i as f64 / 4.0;
            let poa = (950.0 * (-(hour - 12.5).powi(2) / 10.0).exp()).max(0.0);
            let cell = 22.0 + poa / 40.0;
            let ideal = array.ideal_per_inverter_kw(poa, cell, 1.0);
            Sample {
                timestamp: midnight + Duration::minutes(15 * i),
                poa_wm2: poa,
                cell_temp_c: cell,
                module_temp_c: Some(cell - 3.0),
                inverters_kw: vec![ideal * factor; 3],
            }
        })
        .collect()
}

#[test]
fn calibrates_over_lookback_window_from_replay() {
    let source = ReplaySource::from_samples(recorded_day(0.9));
    let calibrator = DerateCalibrator::new(reference_array(), 20.0, &CalibrationConfig::default());
    // a different year: the replay key ignores it
    let now = Utc.with_ymd_and_hms(2026, 8, 10, 23, 59, 0).unwrap();
    let calibration = calibrator.calibrate(&source, now).unwrap();
    assert_relative_eq!(calibration.derate.value(), 0.9, epsilon = 1e-6);
    assert!(calibration.metrics.converged);
    assert!(calibration.metrics.n_points > 0 && calibration.metrics.n_points < 96);
}

#[test]
fn window_outside_recording_is_insufficient() {
    let source = ReplaySource::from_samples(recorded_day(0.9));
    let config = CalibrationConfig {
        lookback_days: 5,
        ..CalibrationConfig::default()
    };
    let calibrator = DerateCalibrator::new(reference_array(), 20.0, &config);
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    assert!(matches!(
        calibrator.calibrate(&source, now),
        Err(CalibrationError::InsufficientData { .. })
    ));
}

#[test]
fn lookback_past_the_calendar_range_is_an_error() {
    let source = ReplaySource::from_samples(recorded_day(0.9));
    let config = CalibrationConfig {
        lookback_days: 200_000_000,
        ..CalibrationConfig::default()
    };
    let calibrator = DerateCalibrator::new(reference_array(), 20.0, &config);
    let now = Utc.with_ymd_and_hms(2026, 8, 10, 23, 59, 0).unwrap();
    assert!(matches!(
        calibrator.calibrate(&source, now),
        Err(CalibrationError::WindowOutOfRange { lookback_days: 200_000_000, .. })
    ));
}

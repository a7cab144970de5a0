//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use pvmon_common::config::AppConfig;
use pvmon_common::{CalibrationMethod, LogFormat};
use tempfile::tempdir;

const SAMPLE: &str = r#"
[source]
path = "data/plant.csv"
poa_column = "POA"
cell_temp_column = "Tcell"
inverter_columns = ["INV1", "INV2", "INV3"]
delimiter = ";"
decimal = "."

[plant]
name = "UFV_X"
module = "Jinko_Solar_Co___Ltd_JKM320PP_72"
modules_per_inverter = 100
inverters = 3

[plant.labels]
site = "north"

[calibration]
method = "huber"
lookback_days = 30

[alarms]
recovery_ticks = 2

[alarms.pr_low]
warn = 0.8
crit = 0.6

[metrics]
endpoint = "http://vm.local:8428/api/v1/import/prometheus"
timeout = 3
retry_attempts = 2

[logging]
directory = "/tmp/pvmon-logs"
format = "pretty"
"#;

#[test]
fn loads_config_from_first_existing_candidate() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("pvmon.toml");
    fs::write(&present, SAMPLE).unwrap();

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).unwrap();
    assert_eq!(loaded.source, present);

    let config = loaded.config;
    assert_eq!(config.plant.name, "UFV_X");
    assert_eq!(config.plant.labels.get("site").map(String::as_str), Some("north"));
    assert_eq!(config.source.delimiter, ';');
    assert_eq!(config.source.decimal, '.');
    assert_eq!(config.calibration.method, CalibrationMethod::Huber);
    assert_eq!(config.calibration.lookback_days, 30);
    assert_eq!(config.alarms.recovery_ticks, 2);
    assert_eq!(config.metrics.timeout, Duration::from_secs(3));
    assert_eq!(config.metrics.retry_attempts, 2);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.backfill.horizon_days, 3);
}

#[test]
fn missing_candidates_are_reported() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = AppConfig::load(&[missing]).unwrap_err();
    assert!(err.to_string().contains("no configuration files found"));
}

#[test]
fn invalid_file_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[plant]\ninverters = 0\n").unwrap();
    let err = AppConfig::from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"));
}

#[test]
fn explicit_path_wins_over_candidates() {
    let dir = tempdir().unwrap();
    let explicit = dir.path().join("explicit.toml");
    let fallback = dir.path().join("fallback.toml");
    fs::write(&explicit, SAMPLE).unwrap();
    fs::write(&fallback, "[plant]\nname = \"other\"\n").unwrap();

    let loaded = AppConfig::load_explicit_or(Some(explicit.as_path()), &[fallback]).unwrap();
    assert_eq!(loaded.source, explicit);
    assert_eq!(loaded.config.plant.name, "UFV_X");
}

#[test]
fn missing_explicit_path_is_fatal() {
    let dir = tempdir().unwrap();
    let explicit = dir.path().join("typo.toml");
    let fallback = dir.path().join("fallback.toml");
    fs::write(&fallback, SAMPLE).unwrap();

    let err = AppConfig::load_explicit_or(Some(explicit.as_path()), &[fallback]).unwrap_err();
    assert!(format!("{err:#}").contains("typo.toml"));
}

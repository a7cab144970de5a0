//! ---
//! ems_section: "11-simulation-test-harness"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Recorded plant data sources and time-grid alignment."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use pvmon_common::SourceConfig;
use pvmon_source::{ReplaySource, SourceError, TimeSeriesSource};
use tempfile::tempdir;

fn config_for(path: std::path::PathBuf) -> SourceConfig {
    SourceConfig {
        path,
        date_column: "Date".to_owned(),
        time_column: "Time".to_owned(),
        poa_column: "POA".to_owned(),
        cell_temp_column: "Tcell".to_owned(),
        module_temp_column: Some("Tmod".to_owned()),
        inverter_columns: vec!["INV1".to_owned(), "INV2".to_owned()],
        delimiter: ';',
        decimal: ',',
    }
}

const CSV: &str = "\
Date;Time;POA;Tcell;Tmod;INV1;INV2
01/06/2022;10:00;800,5;41,2;38,0;120,25;119,75
01/06/2022;10:10;810;42;39;121;120
01/06/2022;10:20;garbage;42;39;121;120
bad-date;10:30;820;43;40;122;121
01/06/2022;10:40;830;43;40;123;122
";

#[test]
fn loads_and_replays_recording() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plant.csv");
    fs::write(&path, CSV).unwrap();

    let source = ReplaySource::from_config(&config_for(path)).unwrap();
    assert_eq!(source.step(), Duration::from_secs(600));
    assert_eq!(source.aligner().len(), 3);

    let sample = source
        .point_at(Utc.with_ymd_and_hms(2026, 6, 1, 10, 4, 59).unwrap())
        .unwrap();
    assert_eq!(
        sample.timestamp,
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
    );
    assert_eq!(sample.poa_wm2, 800.5);
    assert_eq!(sample.module_temp_c, Some(38.0));
    assert_eq!(sample.inverters_kw, vec![120.25, 119.75]);

    // rows with bad values or timestamps leave gaps
    assert!(source
        .point_at(Utc.with_ymd_and_hms(2026, 6, 1, 10, 20, 0).unwrap())
        .is_none());

    let series = source.series_between(
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 55, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 40, 0).unwrap(),
    );
    assert_eq!(series.len(), 3);
    assert!(series.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
}

#[test]
fn missing_column_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plant.csv");
    fs::write(&path, "Date;Time;POA\n01/06/2022;10:00;1\n").unwrap();
    let err = ReplaySource::from_config(&config_for(path)).unwrap_err();
    assert!(matches!(err, SourceError::MissingColumn(ref name) if name == "Tcell"));
}

#[test]
fn file_without_usable_rows_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plant.csv");
    fs::write(&path, "Date;Time;POA;Tcell;Tmod;INV1;INV2\nx;y;1;2;3;4;5\n").unwrap();
    let err = ReplaySource::from_config(&config_for(path)).unwrap_err();
    assert!(matches!(err, SourceError::NoRows(_)));
}

#[test]
fn unreadable_file_is_reported() {
    let dir = tempdir().unwrap();
    let err = ReplaySource::from_config(&config_for(dir.path().join("absent.csv"))).unwrap_err();
    assert!(matches!(err, SourceError::Io { .. }));
}

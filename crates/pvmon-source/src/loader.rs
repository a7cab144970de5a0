//! ---
//! ems_section: "11-simulation-test-harness"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Recorded plant data sources and time-grid alignment."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs::File;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use pvmon_common::{Sample, SourceConfig};
use tracing::{debug, info, warn};

use crate::errors::{Result, SourceError};

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Header positions of the configured columns.
#[derive(Debug)]
struct ColumnMap {
    date: usize,
    time: usize,
    poa: usize,
    cell_temp: usize,
    module_temp: Option<usize>,
    inverters: Vec<usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord, config: &SourceConfig) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| SourceError::MissingColumn(name.to_owned()))
        };
        Ok(Self {
            date: find(&config.date_column)?,
            time: find(&config.time_column)?,
            poa: find(&config.poa_column)?,
            cell_temp: find(&config.cell_temp_column)?,
            module_temp: config
                .module_temp_column
                .as_deref()
                .map(find)
                .transpose()?,
            inverters: config
                .inverter_columns
                .iter()
                .map(|name| find(name))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Load every usable row of the configured CSV, in file order.
///
/// Rows with an unparsable timestamp or numeric field are skipped and
/// counted. A missing column or a file without usable rows is an error.
pub fn load_samples(config: &SourceConfig) -> Result<Vec<Sample>> {
    let file = File::open(&config.path).map_err(|source| SourceError::Io {
        path: config.path.clone(),
        source,
    })?;
    let samples = read_samples(file, config)?;
    if samples.is_empty() {
        return Err(SourceError::NoRows(config.path.clone()));
    }
    info!(
        path = %config.path.display(),
        rows = samples.len(),
        "loaded recorded samples"
    );
    Ok(samples)
}

/// Parse samples from any reader using the configured layout.
pub fn read_samples<R: std::io::Read>(reader: R, config: &SourceConfig) -> Result<Vec<Sample>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(config.delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let columns = ColumnMap::resolve(&headers, config)?;

    let mut samples = Vec::new();
    let mut bad_timestamps = 0usize;
    let mut bad_values = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let Some(timestamp) = parse_timestamp(
            record.get(columns.date).unwrap_or_default(),
            record.get(columns.time).unwrap_or_default(),
            columns.date == columns.time,
        ) else {
            bad_timestamps += 1;
            debug!(line = line + 2, "skipping row with unparsable timestamp");
            continue;
        };
        match parse_row(&record, &columns, config.decimal, timestamp) {
            Some(sample) => samples.push(sample),
            None => {
                bad_values += 1;
                debug!(line = line + 2, "skipping row with unparsable value");
            }
        }
    }

    if bad_timestamps > 0 || bad_values > 0 {
        warn!(
            bad_timestamps,
            bad_values,
            kept = samples.len(),
            "skipped unusable rows while loading recorded samples"
        );
    }
    Ok(samples)
}

fn parse_row(
    record: &StringRecord,
    columns: &ColumnMap,
    decimal: char,
    timestamp: DateTime<Utc>,
) -> Option<Sample> {
    let number = |index: usize| record.get(index).and_then(|raw| parse_number(raw, decimal));
    let module_temp_c = match columns.module_temp {
        Some(index) => Some(number(index)?),
        None => None,
    };
    let inverters_kw = columns
        .inverters
        .iter()
        .map(|index| number(*index))
        .collect::<Option<Vec<_>>>()?;
    Some(Sample {
        timestamp,
        poa_wm2: number(columns.poa)?,
        cell_temp_c: number(columns.cell_temp)?,
        module_temp_c,
        inverters_kw,
    })
}

/// Parse a decimal number written with the configured decimal separator.
pub fn parse_number(raw: &str, decimal: char) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = if decimal == '.' {
        trimmed.parse::<f64>().ok()?
    } else {
        trimmed.replace(decimal, ".").parse::<f64>().ok()?
    };
    value.is_finite().then_some(value)
}

/// Combine a day-first (or ISO) date with a time of day, interpreted as UTC.
/// When date and time share a column the field holds both.
pub fn parse_timestamp(date: &str, time: &str, combined: bool) -> Option<DateTime<Utc>> {
    let date = date.trim();
    if combined {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
            return Some(parsed.with_timezone(&Utc));
        }
        let (date_part, time_part) = date.split_once(|c: char| c == ' ' || c == 'T')?;
        return parse_timestamp(date_part, time_part, false);
    }
    let day = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date, format).ok())?;
    let time = time.trim();
    let clock = TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(time, format).ok())?;
    Some(NaiveDateTime::new(day, clock).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_day_first_dates() {
        let expected = Utc.with_ymd_and_hms(2023, 4, 3, 9, 15, 0).unwrap();
        assert_eq!(parse_timestamp("03/04/2023", "09:15", false), Some(expected));
        assert_eq!(parse_timestamp("03-04-2023", "09:15:00", false), Some(expected));
        assert_eq!(parse_timestamp("03.04.2023", "09:15", false), Some(expected));
        assert_eq!(parse_timestamp("2023-04-03", "09:15", false), Some(expected));
    }

    #[test]
    fn parses_combined_field() {
        let expected = Utc.with_ymd_and_hms(2023, 4, 3, 9, 15, 0).unwrap();
        assert_eq!(parse_timestamp("03/04/2023 09:15", "", true), Some(expected));
        assert_eq!(
            parse_timestamp("2023-04-03T09:15:00Z", "", true),
            Some(expected)
        );
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert_eq!(parse_timestamp("not a date", "09:15", false), None);
        assert_eq!(parse_timestamp("03/04/2023", "25:99", false), None);
    }

    #[test]
    fn parses_decimal_comma() {
        assert_eq!(parse_number("12,5", ','), Some(12.5));
        assert_eq!(parse_number(" 7 ", ','), Some(7.0));
        assert_eq!(parse_number("12.5", '.'), Some(12.5));
        assert_eq!(parse_number("", ','), None);
        assert_eq!(parse_number("n/a", ','), None);
    }
}

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
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Upper bound for calibration lookback and backfill horizon, in days.
pub const MAX_WINDOW_DAYS: u32 = 3_660;

fn default_source_path() -> PathBuf {
    PathBuf::from("data.csv")
}

fn default_date_column() -> String {
    "Timestamp".to_owned()
}

fn default_time_column() -> String {
    "Time".to_owned()
}

fn default_poa_column() -> String {
    "POA Irradiation 1".to_owned()
}

fn default_cell_temp_column() -> String {
    "PV Cell Temperature".to_owned()
}

fn default_module_temp_column() -> Option<String> {
    Some("PV Module Temperature 1".to_owned())
}

fn default_inverter_columns() -> Vec<String> {
    (1..=8).map(|i| format!("Inverter {i}")).collect()
}

fn default_delimiter() -> char {
    ','
}

fn default_decimal() -> char {
    ','
}

fn default_plant_name() -> String {
    "plant".to_owned()
}

fn default_module_name() -> String {
    "Jinko_Solar_Co___Ltd_JKM320PP_72".to_owned()
}

fn default_modules_per_inverter() -> u32 {
    11_340
}

fn default_inverters() -> usize {
    8
}

fn default_sunny_threshold() -> f64 {
    400.0
}

fn default_day_threshold() -> f64 {
    20.0
}

fn default_true() -> bool {
    true
}

fn default_lookback_days() -> u32 {
    60
}

fn default_min_derate() -> f64 {
    0.5
}

fn default_max_derate() -> f64 {
    1.3
}

fn default_static_derate() -> f64 {
    1.0
}

fn default_huber_delta() -> f64 {
    1.5
}

fn default_max_iterations() -> usize {
    50
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_horizon_days() -> u32 {
    3
}

fn default_batch_size() -> usize {
    5_000
}

fn default_endpoint() -> String {
    "http://localhost:8428/api/v1/import/prometheus".to_owned()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_attempts() -> usize {
    4
}

fn default_retry_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_retry_jitter() -> Duration {
    Duration::from_millis(100)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the monitoring daemon.
///
/// Built once at startup and handed to each component constructor; nothing
/// in the workspace mutates it afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub plant: PlantConfig,
    /// Extra module catalog entries, appended after the built-in catalog.
    #[serde(default)]
    pub modules: IndexMap<String, ModuleEntryConfig>,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub alarms: AlarmsConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "PVMON_CONFIG";

    /// Load configuration from disk, respecting the `PVMON_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Resolve the configuration for a CLI invocation. An explicit path wins
    /// over `PVMON_CONFIG` and the candidates, and must exist.
    pub fn load_explicit_or<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        match explicit {
            Some(path) => Ok(LoadedAppConfig {
                config: Self::from_path(path)?,
                source: path.to_path_buf(),
            }),
            None => Self::load_with_source(candidates),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.plant.validate()?;
        if self.source.inverter_columns.len() != self.plant.inverters {
            return Err(anyhow!(
                "source lists {} inverter columns but plant declares {} inverters",
                self.source.inverter_columns.len(),
                self.plant.inverters
            ));
        }
        for (name, module) in &self.modules {
            module.validate(name)?;
        }
        self.calibration.validate()?;
        self.alarms.validate()?;
        self.backfill.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Location and column mapping of the recorded plant data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_time_column")]
    pub time_column: String,
    #[serde(default = "default_poa_column")]
    pub poa_column: String,
    #[serde(default = "default_cell_temp_column")]
    pub cell_temp_column: String,
    #[serde(default = "default_module_temp_column")]
    pub module_temp_column: Option<String>,
    #[serde(default = "default_inverter_columns")]
    pub inverter_columns: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_decimal")]
    pub decimal: char,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            date_column: default_date_column(),
            time_column: default_time_column(),
            poa_column: default_poa_column(),
            cell_temp_column: default_cell_temp_column(),
            module_temp_column: default_module_temp_column(),
            inverter_columns: default_inverter_columns(),
            delimiter: default_delimiter(),
            decimal: default_decimal(),
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inverter_columns.is_empty() {
            return Err(anyhow!("source.inverter_columns must not be empty"));
        }
        if !self.delimiter.is_ascii() {
            return Err(anyhow!("source.delimiter must be a single ASCII character"));
        }
        Ok(())
    }
}

/// Physical layout of the plant and the irradiance classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantConfig {
    /// Value of the `plant` label attached to alarm series.
    #[serde(default = "default_plant_name")]
    pub name: String,
    #[serde(default = "default_module_name")]
    pub module: String,
    #[serde(default = "default_modules_per_inverter")]
    pub modules_per_inverter: u32,
    #[serde(default = "default_inverters")]
    pub inverters: usize,
    #[serde(default = "default_sunny_threshold")]
    pub sunny_threshold_wm2: f64,
    #[serde(default = "default_day_threshold")]
    pub day_threshold_wm2: f64,
    /// Additional labels attached to every alarm series.
    #[serde(default)]
    pub labels: IndexMap<String, String>,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            name: default_plant_name(),
            module: default_module_name(),
            modules_per_inverter: default_modules_per_inverter(),
            inverters: default_inverters(),
            sunny_threshold_wm2: default_sunny_threshold(),
            day_threshold_wm2: default_day_threshold(),
            labels: IndexMap::new(),
        }
    }
}

impl PlantConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inverters == 0 {
            return Err(anyhow!("plant.inverters must be greater than zero"));
        }
        if self.modules_per_inverter == 0 {
            return Err(anyhow!("plant.modules_per_inverter must be greater than zero"));
        }
        if self.day_threshold_wm2 < 0.0 {
            return Err(anyhow!("plant.day_threshold_wm2 must not be negative"));
        }
        if self.day_threshold_wm2 > self.sunny_threshold_wm2 {
            return Err(anyhow!(
                "plant.day_threshold_wm2 ({}) must not exceed plant.sunny_threshold_wm2 ({})",
                self.day_threshold_wm2,
                self.sunny_threshold_wm2
            ));
        }
        Ok(())
    }
}

/// Module constants supplied through configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModuleEntryConfig {
    /// Power temperature coefficient in %/°C (typically negative).
    pub gamma_pct: f64,
    /// Rated power at standard test conditions (W).
    pub stc_w: f64,
}

impl ModuleEntryConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.stc_w <= 0.0 {
            return Err(anyhow!("modules.{name}.stc_w must be positive"));
        }
        Ok(())
    }
}

/// Regression flavour used by the derate calibrator.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMethod {
    Ols,
    Huber,
    #[default]
    Both,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_min_derate")]
    pub min_derate: f64,
    #[serde(default = "default_max_derate")]
    pub max_derate: f64,
    /// Derate used when calibration is disabled or fails.
    #[serde(default = "default_static_derate")]
    pub static_derate: f64,
    #[serde(default)]
    pub method: CalibrationMethod,
    #[serde(default = "default_huber_delta")]
    pub huber_delta_kw: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub recalibrate_every: Option<Duration>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback_days: default_lookback_days(),
            min_derate: default_min_derate(),
            max_derate: default_max_derate(),
            static_derate: default_static_derate(),
            method: CalibrationMethod::default(),
            huber_delta_kw: default_huber_delta(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            recalibrate_every: None,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_derate >= self.max_derate {
            return Err(anyhow!(
                "calibration.min_derate ({}) must be below calibration.max_derate ({})",
                self.min_derate,
                self.max_derate
            ));
        }
        if !(self.min_derate..=self.max_derate).contains(&self.static_derate) {
            return Err(anyhow!(
                "calibration.static_derate ({}) must lie within [{}, {}]",
                self.static_derate,
                self.min_derate,
                self.max_derate
            ));
        }
        if self.lookback_days == 0 || self.lookback_days > MAX_WINDOW_DAYS {
            return Err(anyhow!(
                "calibration.lookback_days ({}) must lie within [1, {MAX_WINDOW_DAYS}]",
                self.lookback_days
            ));
        }
        if self.huber_delta_kw <= 0.0 {
            return Err(anyhow!("calibration.huber_delta_kw must be positive"));
        }
        if self.tolerance <= 0.0 {
            return Err(anyhow!("calibration.tolerance must be positive"));
        }
        if matches!(self.recalibrate_every, Some(every) if every.is_zero()) {
            return Err(anyhow!("calibration.recalibrate_every must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlarmsConfig {
    /// Consecutive lower raw evaluations required before a severity drops.
    /// Zero keeps every rule a pass-through.
    #[serde(default)]
    pub recovery_ticks: u32,
    #[serde(default)]
    pub pr_low: PrLowConfig,
    #[serde(default)]
    pub inverter_offline: InverterOfflineConfig,
    #[serde(default)]
    pub sunny_no_production: SunnyNoProductionConfig,
    #[serde(default)]
    pub temperature_delta: TemperatureDeltaConfig,
    #[serde(default)]
    pub irradiance_ramp: IrradianceRampConfig,
}

impl AlarmsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pr_low.crit > self.pr_low.warn {
            return Err(anyhow!(
                "alarms.pr_low.crit ({}) must not exceed alarms.pr_low.warn ({})",
                self.pr_low.crit,
                self.pr_low.warn
            ));
        }
        if self.temperature_delta.warn_c > self.temperature_delta.crit_c {
            return Err(anyhow!(
                "alarms.temperature_delta.warn_c must not exceed alarms.temperature_delta.crit_c"
            ));
        }
        if self.irradiance_ramp.warn_wm2 > self.irradiance_ramp.crit_wm2 {
            return Err(anyhow!(
                "alarms.irradiance_ramp.warn_wm2 must not exceed alarms.irradiance_ramp.crit_wm2"
            ));
        }
        if self.inverter_offline.min_kw < 0.0 || self.sunny_no_production.max_total_kw < 0.0 {
            return Err(anyhow!("alarm power thresholds must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrLowConfig {
    pub warn: f64,
    pub crit: f64,
}

impl Default for PrLowConfig {
    fn default() -> Self {
        Self {
            warn: 0.82,
            crit: 0.70,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InverterOfflineConfig {
    pub min_kw: f64,
    pub min_poa_wm2: f64,
}

impl Default for InverterOfflineConfig {
    fn default() -> Self {
        Self {
            min_kw: 0.05,
            min_poa_wm2: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SunnyNoProductionConfig {
    pub poa_wm2: f64,
    pub max_total_kw: f64,
}

impl Default for SunnyNoProductionConfig {
    fn default() -> Self {
        Self {
            poa_wm2: 600.0,
            max_total_kw: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureDeltaConfig {
    pub warn_c: f64,
    pub crit_c: f64,
}

impl Default for TemperatureDeltaConfig {
    fn default() -> Self {
        Self {
            warn_c: 8.0,
            crit_c: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IrradianceRampConfig {
    pub warn_wm2: f64,
    pub crit_wm2: f64,
}

impl Default for IrradianceRampConfig {
    fn default() -> Self {
        Self {
            warn_wm2: 250.0,
            crit_wm2: 400.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    /// Maximum number of lines per publish request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizon_days: default_horizon_days(),
            batch_size: default_batch_size(),
        }
    }
}

impl BackfillConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("backfill.batch_size must be greater than zero"));
        }
        if self.horizon_days > MAX_WINDOW_DAYS {
            return Err(anyhow!(
                "backfill.horizon_days ({}) must not exceed {MAX_WINDOW_DAYS}",
                self.horizon_days
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Line-protocol import endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_base_delay", rename = "retry_base_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_base_delay: Duration,
    #[serde(default = "default_retry_jitter", rename = "retry_jitter_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_jitter: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_jitter: default_retry_jitter(),
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("metrics.endpoint must not be empty"));
        }
        if self.retry_attempts == 0 {
            return Err(anyhow!("metrics.retry_attempts must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use chrono::NaiveDate;
use pvmon_common::time::noon_utc;
use pvmon_common::Observation;
use pvmon_metrics::{MetricLine, MetricsSink, SinkError};
use pvmon_rt::ShutdownListener;
use tracing::{debug, error};

use crate::energy::EnergySnapshot;

pub const SOLAR_GHI: &str = "solar_ghi_wm2";
pub const PV_IDEAL_KW: &str = "pv_ideal_kw";
pub const PV_REAL_KW: &str = "pv_real_kw";
pub const PR_INSTANT: &str = "plant_pr_inst";
pub const PR_DAILY: &str = "plant_pr_daily";
pub const SUNNY_FLAG: &str = "weather_sunny_flag";
pub const DAY_FLAG: &str = "day_flag";
pub const MODULE_TEMP: &str = "pv_module_temp_c";
pub const CELL_TEMP: &str = "pv_cell_temp_c";
pub const REAL_ENERGY_TOTAL: &str = "plant_real_energy_kwh_total";
pub const IDEAL_ENERGY_TOTAL: &str = "plant_ideal_energy_kwh_total";
pub const MODEL_ACCURACY: &str = "model_accuracy_pct";

const IRRADIANCE_DECIMALS: u32 = 3;
const POWER_DECIMALS: u32 = 3;
const TEMP_DECIMALS: u32 = 3;
const PR_DECIMALS: u32 = 4;
const ENERGY_DECIMALS: u32 = 6;
const ACCURACY_DECIMALS: u32 = 4;

/// Telemetry lines of one tick, grouped by metric family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickLines {
    pub irradiance: Vec<MetricLine>,
    pub inverters: Vec<MetricLine>,
    pub temperatures: Vec<MetricLine>,
    pub pr_instant: Vec<MetricLine>,
    pub flags: Vec<MetricLine>,
    pub energy: Vec<MetricLine>,
}

impl TickLines {
    pub fn render(observation: &Observation, energy: &EnergySnapshot) -> Self {
        let ts = observation.timestamp_ms();

        let irradiance =
            vec![MetricLine::new(SOLAR_GHI, observation.poa_wm2, ts)
                .label("source", "file")
                .precision(IRRADIANCE_DECIMALS)];

        let mut inverters = Vec::with_capacity(observation.inverters_kw.len() * 2);
        for (index, real_kw) in observation.inverters_kw.iter().enumerate() {
            let inverter = index.to_string();
            inverters.push(
                MetricLine::new(PV_IDEAL_KW, observation.ideal_per_inverter_kw, ts)
                    .label("inverter", inverter.clone())
                    .precision(POWER_DECIMALS),
            );
            inverters.push(
                MetricLine::new(PV_REAL_KW, *real_kw, ts)
                    .label("inverter", inverter)
                    .precision(POWER_DECIMALS),
            );
        }

        let mut temperatures = Vec::with_capacity(2);
        if let Some(module_temp) = observation.module_temp_c {
            temperatures.push(MetricLine::new(MODULE_TEMP, module_temp, ts).precision(TEMP_DECIMALS));
        }
        temperatures.push(
            MetricLine::new(CELL_TEMP, observation.cell_temp_c, ts).precision(TEMP_DECIMALS),
        );

        let pr_instant =
            vec![MetricLine::new(PR_INSTANT, observation.pr_instant, ts).precision(PR_DECIMALS)];

        let flags = vec![
            MetricLine::new(SUNNY_FLAG, flag(observation.sunny), ts).precision(0),
            MetricLine::new(DAY_FLAG, flag(observation.day), ts).precision(0),
        ];

        let energy = vec![
            MetricLine::new(REAL_ENERGY_TOTAL, energy.real_kwh, ts).precision(ENERGY_DECIMALS),
            MetricLine::new(IDEAL_ENERGY_TOTAL, energy.ideal_kwh, ts).precision(ENERGY_DECIMALS),
            MetricLine::new(MODEL_ACCURACY, energy.accuracy_pct, ts).precision(ACCURACY_DECIMALS),
        ];

        Self {
            irradiance,
            inverters,
            temperatures,
            pr_instant,
            flags,
            energy,
        }
    }

    /// Append every group to `other`, preserving group order.
    pub fn extend_into(self, batches: &mut TickLines) {
        batches.irradiance.extend(self.irradiance);
        batches.inverters.extend(self.inverters);
        batches.temperatures.extend(self.temperatures);
        batches.pr_instant.extend(self.pr_instant);
        batches.flags.extend(self.flags);
        batches.energy.extend(self.energy);
    }

    /// Groups in emission order, labelled for logging.
    pub fn into_groups(self) -> [(&'static str, Vec<MetricLine>); 6] {
        [
            ("irradiance", self.irradiance),
            ("inverters", self.inverters),
            ("temperatures", self.temperatures),
            ("pr_instant", self.pr_instant),
            ("flags", self.flags),
            ("energy", self.energy),
        ]
    }

    pub fn into_lines(self) -> Vec<MetricLine> {
        self.into_groups()
            .into_iter()
            .flat_map(|(_, lines)| lines)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.irradiance.len()
            + self.inverters.len()
            + self.temperatures.len()
            + self.pr_instant.len()
            + self.flags.len()
            + self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Daily PR point, stamped at 12:00 UTC of its day.
pub fn daily_pr_line(day: NaiveDate, pr: f64) -> MetricLine {
    MetricLine::new(PR_DAILY, pr, noon_utc(day).timestamp_millis()).precision(PR_DECIMALS)
}

/// Result of pushing one group of lines through a sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub sent: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl PublishOutcome {
    pub fn absorb(&mut self, other: PublishOutcome) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.cancelled |= other.cancelled;
    }
}

/// Publish `lines` in requests of at most `batch_size` lines. A failed chunk
/// is logged and counted; the remaining chunks are still attempted unless
/// shutdown has been requested.
pub async fn publish_chunked(
    sink: &dyn MetricsSink,
    group: &str,
    lines: &[MetricLine],
    batch_size: usize,
    shutdown: &ShutdownListener,
) -> PublishOutcome {
    let mut outcome = PublishOutcome::default();
    for chunk in lines.chunks(batch_size.max(1)) {
        if shutdown.is_triggered() {
            outcome.cancelled = true;
            break;
        }
        match sink.publish(chunk).await {
            Ok(()) => {
                outcome.sent += chunk.len();
                debug!(group, lines = chunk.len(), "published chunk");
            }
            Err(SinkError::Cancelled) => {
                outcome.failed += chunk.len();
                outcome.cancelled = true;
                break;
            }
            Err(err) => {
                outcome.failed += chunk.len();
                error!(group, lines = chunk.len(), error = %err, "dropping metric chunk");
            }
        }
    }
    outcome
}

//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fault detection rules and alarm state tracking."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt::Debug;

use pvmon_common::config::{
    InverterOfflineConfig, IrradianceRampConfig, PrLowConfig, SunnyNoProductionConfig,
    TemperatureDeltaConfig,
};
use pvmon_common::Observation;

use crate::severity::Severity;

/// Raw outcome of one rule evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    pub severity: Severity,
    /// Diagnostic attached as the `detail` label while the alarm is active.
    pub detail: Option<String>,
}

impl Evaluation {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn of(severity: Severity) -> Self {
        Self {
            severity,
            detail: None,
        }
    }

    pub fn with_detail(severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            severity,
            detail: Some(detail.into()),
        }
    }
}

/// One alarm kind. Rules own whatever carry-over state they need and are
/// stepped by exactly one engine.
pub trait AlarmRule: Send + Debug {
    /// Value of the `alarm` label.
    fn name(&self) -> &'static str;

    fn evaluate(&mut self, observation: &Observation) -> Evaluation;

    /// Map the raw severity onto the effective one given the previous
    /// effective severity. Pass-through unless a rule debounces.
    fn hysteresis(&mut self, _previous: Severity, raw: Severity) -> Severity {
        raw
    }
}

/// Grade `value` against ascending thresholds.
fn grade_at_least(value: f64, warn: f64, crit: f64) -> Severity {
    if value >= crit {
        Severity::Crit
    } else if value >= warn {
        Severity::Warn
    } else {
        Severity::Ok
    }
}

/// Low instantaneous PR during daylight.
#[derive(Debug, Clone)]
pub struct PrLowRule {
    config: PrLowConfig,
}

impl PrLowRule {
    pub const NAME: &'static str = "alarm_pr_low";

    pub fn new(config: PrLowConfig) -> Self {
        Self { config }
    }
}

impl AlarmRule for PrLowRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&mut self, observation: &Observation) -> Evaluation {
        if !observation.day {
            return Evaluation::ok();
        }
        let pr = observation.pr_instant;
        if pr <= self.config.crit {
            Evaluation::of(Severity::Crit)
        } else if pr <= self.config.warn {
            Evaluation::of(Severity::Warn)
        } else {
            Evaluation::ok()
        }
    }
}

/// Inverters reporting (near) zero output under usable irradiance.
#[derive(Debug, Clone)]
pub struct InverterOfflineRule {
    config: InverterOfflineConfig,
}

impl InverterOfflineRule {
    pub const NAME: &'static str = "alarm_inverter_offline";

    pub fn new(config: InverterOfflineConfig) -> Self {
        Self { config }
    }
}

impl AlarmRule for InverterOfflineRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&mut self, observation: &Observation) -> Evaluation {
        if !observation.day || observation.poa_wm2 < self.config.min_poa_wm2 {
            return Evaluation::ok();
        }
        let tripped: Vec<usize> = observation
            .inverters_kw
            .iter()
            .enumerate()
            .filter(|(_, kw)| **kw <= self.config.min_kw)
            .map(|(index, _)| index)
            .collect();
        match tripped.as_slice() {
            [] => Evaluation::ok(),
            [single] => Evaluation::with_detail(Severity::Warn, format!("inverter_{single}_zero")),
            many => {
                let indices = many
                    .iter()
                    .map(usize::to_string)
                    .collect::<Vec<_>>()
                    .join("_");
                Evaluation::with_detail(Severity::Crit, format!("inverters_{indices}_zero"))
            }
        }
    }
}

/// Strong irradiance with the whole plant producing nothing.
#[derive(Debug, Clone)]
pub struct SunnyNoProductionRule {
    config: SunnyNoProductionConfig,
}

impl SunnyNoProductionRule {
    pub const NAME: &'static str = "alarm_sunny_no_production";

    pub fn new(config: SunnyNoProductionConfig) -> Self {
        Self { config }
    }
}

impl AlarmRule for SunnyNoProductionRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&mut self, observation: &Observation) -> Evaluation {
        if observation.poa_wm2 >= self.config.poa_wm2
            && observation.total_ac_kw <= self.config.max_total_kw
        {
            Evaluation::of(Severity::Crit)
        } else {
            Evaluation::ok()
        }
    }
}

/// Disagreement between the cell and module temperature sensors.
#[derive(Debug, Clone)]
pub struct TemperatureDeltaRule {
    config: TemperatureDeltaConfig,
}

impl TemperatureDeltaRule {
    pub const NAME: &'static str = "alarm_temp_delta";

    pub fn new(config: TemperatureDeltaConfig) -> Self {
        Self { config }
    }
}

impl AlarmRule for TemperatureDeltaRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&mut self, observation: &Observation) -> Evaluation {
        let Some(module_temp) = observation.module_temp_c else {
            return Evaluation::ok();
        };
        let delta = (observation.cell_temp_c - module_temp).abs();
        Evaluation::of(grade_at_least(
            delta,
            self.config.warn_c,
            self.config.crit_c,
        ))
    }
}

/// Sudden irradiance change between consecutive observations.
#[derive(Debug, Clone)]
pub struct IrradianceRampRule {
    config: IrradianceRampConfig,
    previous_wm2: Option<f64>,
}

impl IrradianceRampRule {
    pub const NAME: &'static str = "alarm_poa_ramp";

    pub fn new(config: IrradianceRampConfig) -> Self {
        Self {
            config,
            previous_wm2: None,
        }
    }
}

impl AlarmRule for IrradianceRampRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&mut self, observation: &Observation) -> Evaluation {
        let current = observation.poa_wm2;
        match self.previous_wm2.replace(current) {
            None => Evaluation::ok(),
            Some(previous) => Evaluation::of(grade_at_least(
                (current - previous).abs(),
                self.config.warn_wm2,
                self.config.crit_wm2,
            )),
        }
    }
}

/// Recovery latch around another rule: the effective severity only drops
/// after `recovery_ticks` consecutive raw evaluations below it. Escalation
/// is immediate.
#[derive(Debug, Clone)]
pub struct Debounced<R> {
    inner: R,
    recovery_ticks: u32,
    below: u32,
}

impl<R: AlarmRule> Debounced<R> {
    pub fn new(inner: R, recovery_ticks: u32) -> Self {
        Self {
            inner,
            recovery_ticks,
            below: 0,
        }
    }
}

impl<R: AlarmRule> AlarmRule for Debounced<R> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn evaluate(&mut self, observation: &Observation) -> Evaluation {
        self.inner.evaluate(observation)
    }

    fn hysteresis(&mut self, previous: Severity, raw: Severity) -> Severity {
        let raw = self.inner.hysteresis(previous, raw);
        if raw >= previous {
            self.below = 0;
            return raw;
        }
        self.below += 1;
        if self.below >= self.recovery_ticks {
            self.below = 0;
            raw
        } else {
            previous
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn observation() -> Observation {
        Observation {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            poa_wm2: 800.0,
            total_ac_kw: 40.0,
            ideal_per_inverter_kw: 12.0,
            ideal_total_kw: 48.0,
            pr_instant: 0.9,
            sunny: true,
            day: true,
            cell_temp_c: 45.0,
            module_temp_c: Some(42.0),
            inverters_kw: vec![10.0, 10.0, 10.0, 10.0],
        }
    }

    #[test]
    fn pr_low_grades_only_in_daylight() {
        let mut rule = PrLowRule::new(PrLowConfig::default());
        let mut obs = observation();
        assert_eq!(rule.evaluate(&obs).severity, Severity::Ok);
        obs.pr_instant = 0.82;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Warn);
        obs.pr_instant = 0.70;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Crit);
        obs.day = false;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Ok);
    }

    #[test]
    fn single_offline_inverter_warns_with_index() {
        let mut rule = InverterOfflineRule::new(InverterOfflineConfig::default());
        let mut obs = observation();
        obs.poa_wm2 = 200.0;
        obs.inverters_kw[2] = 0.0;
        let eval = rule.evaluate(&obs);
        assert_eq!(eval.severity, Severity::Warn);
        assert_eq!(eval.detail.as_deref(), Some("inverter_2_zero"));
    }

    #[test]
    fn several_offline_inverters_are_critical() {
        let mut rule = InverterOfflineRule::new(InverterOfflineConfig::default());
        let mut obs = observation();
        obs.inverters_kw[0] = 0.05;
        obs.inverters_kw[3] = -0.1;
        let eval = rule.evaluate(&obs);
        assert_eq!(eval.severity, Severity::Crit);
        assert_eq!(eval.detail.as_deref(), Some("inverters_0_3_zero"));
    }

    #[test]
    fn offline_check_ignores_low_irradiance() {
        let mut rule = InverterOfflineRule::new(InverterOfflineConfig::default());
        let mut obs = observation();
        obs.poa_wm2 = 199.9;
        obs.inverters_kw = vec![0.0; 4];
        assert_eq!(rule.evaluate(&obs), Evaluation::ok());
    }

    #[test]
    fn sunny_without_production_is_critical() {
        let mut rule = SunnyNoProductionRule::new(SunnyNoProductionConfig::default());
        let mut obs = observation();
        obs.poa_wm2 = 600.0;
        obs.total_ac_kw = 0.05;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Crit);
        obs.poa_wm2 = 599.0;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Ok);
    }

    #[test]
    fn temperature_delta_needs_both_sensors() {
        let mut rule = TemperatureDeltaRule::new(TemperatureDeltaConfig::default());
        let mut obs = observation();
        obs.module_temp_c = Some(37.0);
        assert_eq!(rule.evaluate(&obs).severity, Severity::Warn);
        obs.module_temp_c = Some(57.0);
        assert_eq!(rule.evaluate(&obs).severity, Severity::Crit);
        obs.module_temp_c = None;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Ok);
    }

    #[test]
    fn ramp_first_observation_has_no_baseline() {
        let mut rule = IrradianceRampRule::new(IrradianceRampConfig::default());
        let mut obs = observation();
        obs.poa_wm2 = 1000.0;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Ok);
        obs.poa_wm2 = 600.0;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Crit);
        obs.poa_wm2 = 350.0;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Warn);
        obs.poa_wm2 = 300.0;
        assert_eq!(rule.evaluate(&obs).severity, Severity::Ok);
    }

    #[test]
    fn debounce_holds_severity_until_recovery_ticks_elapse() {
        let mut rule = Debounced::new(PrLowRule::new(PrLowConfig::default()), 2);
        assert_eq!(rule.hysteresis(Severity::Ok, Severity::Crit), Severity::Crit);
        assert_eq!(rule.hysteresis(Severity::Crit, Severity::Ok), Severity::Crit);
        assert_eq!(rule.hysteresis(Severity::Crit, Severity::Ok), Severity::Ok);
    }

    #[test]
    fn debounce_counter_resets_on_relapse() {
        let mut rule = Debounced::new(PrLowRule::new(PrLowConfig::default()), 2);
        assert_eq!(rule.hysteresis(Severity::Warn, Severity::Ok), Severity::Warn);
        assert_eq!(rule.hysteresis(Severity::Warn, Severity::Warn), Severity::Warn);
        assert_eq!(rule.hysteresis(Severity::Warn, Severity::Ok), Severity::Warn);
        assert_eq!(rule.hysteresis(Severity::Warn, Severity::Ok), Severity::Ok);
    }

    #[test]
    fn zero_recovery_ticks_is_pass_through() {
        let mut rule = Debounced::new(PrLowRule::new(PrLowConfig::default()), 0);
        assert_eq!(rule.hysteresis(Severity::Crit, Severity::Ok), Severity::Ok);
    }
}

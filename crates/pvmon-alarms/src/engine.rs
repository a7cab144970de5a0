//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fault detection rules and alarm state tracking."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use pvmon_common::{AlarmsConfig, Observation, PlantConfig};
use pvmon_metrics::MetricLine;
use serde::Serialize;
use tracing::info;

use crate::rules::{
    AlarmRule, Debounced, InverterOfflineRule, IrradianceRampRule, PrLowRule,
    SunnyNoProductionRule, TemperatureDeltaRule,
};
use crate::severity::Severity;

pub const ALERT_STATE_METRIC: &str = "alert_state";
pub const ALERT_COUNT_METRIC: &str = "alert_count";

/// Memory kept per rule between observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlarmRuleState {
    pub severity: Severity,
    /// Number of observations with a non-OK effective severity.
    pub count: u64,
    pub detail: Option<String>,
}

#[derive(Debug)]
struct RuleSlot {
    rule: Box<dyn AlarmRule>,
    state: AlarmRuleState,
}

/// Ordered set of independent rules stepped once per observation.
///
/// An engine is owned by a single execution unit; backfill and realtime each
/// build their own so historical replay never touches live alarm state.
#[derive(Debug)]
pub struct AlarmEngine {
    slots: Vec<RuleSlot>,
    labels: Vec<(String, String)>,
}

impl AlarmEngine {
    pub fn new(rules: Vec<Box<dyn AlarmRule>>, labels: Vec<(String, String)>) -> Self {
        Self {
            slots: rules
                .into_iter()
                .map(|rule| RuleSlot {
                    rule,
                    state: AlarmRuleState::default(),
                })
                .collect(),
            labels,
        }
    }

    /// The five standard rules, labelled with the plant name and any extra
    /// configured labels.
    pub fn from_config(alarms: &AlarmsConfig, plant: &PlantConfig) -> Self {
        let mut labels = vec![("plant".to_owned(), plant.name.clone())];
        labels.extend(
            plant
                .labels
                .iter()
                .filter(|(key, _)| key.as_str() != "plant" && key.as_str() != "alarm")
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        let ticks = alarms.recovery_ticks;
        let rules: Vec<Box<dyn AlarmRule>> = vec![
            Box::new(Debounced::new(PrLowRule::new(alarms.pr_low), ticks)),
            Box::new(Debounced::new(
                InverterOfflineRule::new(alarms.inverter_offline),
                ticks,
            )),
            Box::new(Debounced::new(
                SunnyNoProductionRule::new(alarms.sunny_no_production),
                ticks,
            )),
            Box::new(Debounced::new(
                TemperatureDeltaRule::new(alarms.temperature_delta),
                ticks,
            )),
            Box::new(Debounced::new(
                IrradianceRampRule::new(alarms.irradiance_ramp),
                ticks,
            )),
        ];
        Self::new(rules, labels)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current state of every rule, in rule order.
    pub fn states(&self) -> impl Iterator<Item = (&'static str, &AlarmRuleState)> {
        self.slots
            .iter()
            .map(|slot| (slot.rule.name(), &slot.state))
    }

    pub fn state(&self, name: &str) -> Option<&AlarmRuleState> {
        self.states()
            .find(|(rule, _)| *rule == name)
            .map(|(_, state)| state)
    }

    /// Evaluate every rule once and render its state and running count.
    pub fn step(&mut self, observation: &Observation) -> Vec<MetricLine> {
        let timestamp_ms = observation.timestamp_ms();
        let mut lines = Vec::with_capacity(self.slots.len() * 2);
        for slot in &mut self.slots {
            let name = slot.rule.name();
            let evaluation = slot.rule.evaluate(observation);
            let previous = slot.state.severity;
            let effective = slot.rule.hysteresis(previous, evaluation.severity);

            let detail = if !effective.is_fault() {
                None
            } else if effective == evaluation.severity {
                evaluation.detail
            } else {
                slot.state.detail.clone()
            };
            if effective != previous {
                info!(
                    rule = name,
                    from = %previous,
                    to = %effective,
                    detail = detail.as_deref().unwrap_or(""),
                    ts = %observation.timestamp,
                    "alarm severity changed"
                );
            }
            slot.state.severity = effective;
            slot.state.detail = detail;
            if effective.is_fault() {
                slot.state.count += 1;
            }

            let mut labels = Vec::with_capacity(self.labels.len() + 2);
            labels.push(("alarm".to_owned(), name.to_owned()));
            labels.extend(self.labels.iter().cloned());
            if let Some(detail) = &slot.state.detail {
                labels.push(("detail".to_owned(), detail.clone()));
            }
            lines.push(
                MetricLine::new(
                    ALERT_STATE_METRIC,
                    f64::from(effective.level()),
                    timestamp_ms,
                )
                .labels(labels.clone())
                .precision(0),
            );
            lines.push(
                MetricLine::new(ALERT_COUNT_METRIC, slot.state.count as f64, timestamp_ms)
                    .labels(labels)
                    .precision(0),
            );
        }
        lines
    }
}

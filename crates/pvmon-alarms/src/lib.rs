//! ---
//! ems_section: "07-resilience-fault-tolerance"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fault detection rules and alarm state tracking."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Alarm evaluation for pvmon.
//!
//! Each [`AlarmRule`] turns an [`Observation`](pvmon_common::Observation) into
//! a raw [`Severity`]; the [`AlarmEngine`] applies hysteresis, keeps the
//! per-rule state and renders `alert_state` / `alert_count` lines.

pub mod engine;
pub mod rules;
pub mod severity;

pub use engine::{AlarmEngine, AlarmRuleState, ALERT_COUNT_METRIC, ALERT_STATE_METRIC};
pub use rules::{
    AlarmRule, Debounced, Evaluation, InverterOfflineRule, IrradianceRampRule, PrLowRule,
    SunnyNoProductionRule, TemperatureDeltaRule,
};
pub use severity::Severity;

//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the pvmon workspace.
//! This crate exposes configuration loading, tracing setup, the sample and
//! observation records exchanged between components, and calendar helpers.

pub mod config;
pub mod logging;
pub mod model;
pub mod time;

pub use config::{
    AlarmsConfig, AppConfig, BackfillConfig, CalibrationConfig, CalibrationMethod,
    LoggingConfig, MetricsConfig, ModuleEntryConfig, PlantConfig, SourceConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use model::{Observation, Sample};

//! ---
//! ems_section: "11-simulation-test-harness"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Recorded plant data sources and time-grid alignment."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Data sources for pvmon.
//!
//! A [`TimeSeriesSource`] hands out [`Sample`](pvmon_common::Sample)s for
//! aligned instants. The shipped [`ReplaySource`] loads a historical CSV once
//! and replays it indefinitely through the [`TimeGridAligner`], which looks
//! rows up by month, day, hour and minute only.

pub mod aligner;
pub mod errors;
pub mod loader;
pub mod source;

pub use aligner::{ReplayKey, TimeGridAligner, DEFAULT_STEP};
pub use errors::{Result, SourceError};
pub use source::{ReplaySource, TimeSeriesSource};

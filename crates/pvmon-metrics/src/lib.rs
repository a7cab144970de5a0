//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metric line encoding and time-series export sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Metric export for pvmon.
//!
//! Every derived value leaves the process as a [`MetricLine`] rendered in the
//! Prometheus import text format and handed to a [`MetricsSink`].

pub mod errors;
pub mod line;
pub mod sink;
pub mod victoria;

pub use errors::{Result, SinkError};
pub use line::{encode_lines, round_to, MetricLine};
pub use sink::{MemorySink, MetricsSink, RetryingSink, StdoutSink};
pub use victoria::VictoriaMetricsSink;

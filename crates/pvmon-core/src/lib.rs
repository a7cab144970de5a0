//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Orchestration of the pvmon pipeline.
//!
//! Samples become [`Observation`](pvmon_common::Observation)s through one
//! shared [`ObservationBuilder`]; the [`BackfillRunner`] replays a bounded
//! history in batches while the [`RealtimeRunner`] follows the wall clock.
//! [`Pipeline`] wires both to the configured source, sink and calibrator.

pub mod backfill;
pub mod emission;
pub mod energy;
pub mod observation;
pub mod performance;
pub mod pipeline;
pub mod realtime;

pub use backfill::{BackfillPhase, BackfillReport, BackfillRunner};
pub use emission::TickLines;
pub use energy::{CompletedDay, EnergyLedger, EnergySnapshot, EnergyTracker};
pub use observation::ObservationBuilder;
pub use performance::{pr_daily, pr_instant, PR_CEILING};
pub use pipeline::{Pipeline, PipelineHandle, PipelineReport};
pub use realtime::{RealtimeReport, RealtimeRunner, RealtimeState};

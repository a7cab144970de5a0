//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Runtime helpers supporting the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Runtime helpers for the pvmon pipeline: cooperative shutdown, tick
//! sources for the realtime loop and retry backoff policies.

pub mod retry;
pub mod shutdown;
pub mod ticker;

pub use retry::RetryPolicy;
pub use shutdown::{shutdown_channel, ShutdownListener, ShutdownTrigger};
pub use ticker::{ScriptedTicker, Ticker, WallClockTicker};

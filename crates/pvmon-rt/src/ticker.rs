//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Runtime helpers supporting the monitoring pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pvmon_common::time::next_boundary;
use tracing::trace;

/// Source of wall-clock instants for the realtime loop.
///
/// Each call waits until the next tick is due and returns its instant.
/// `None` means the ticker is exhausted and the loop should stop.
#[async_trait]
pub trait Ticker: Send {
    async fn next_tick(&mut self) -> Option<DateTime<Utc>>;
}

/// Sleeps until the next epoch-aligned step boundary on the system clock.
#[derive(Debug, Clone)]
pub struct WallClockTicker {
    step: Duration,
}

impl WallClockTicker {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }
}

#[async_trait]
impl Ticker for WallClockTicker {
    async fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        let due = next_boundary(now, self.step);
        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
        trace!(due = %due, wait_ms = wait.as_millis() as u64, "sleeping until next tick");
        tokio::time::sleep(wait).await;
        Some(due)
    }
}

/// Replays a fixed list of instants without waiting; used by tests and
/// offline runs.
#[derive(Debug, Default)]
pub struct ScriptedTicker {
    instants: VecDeque<DateTime<Utc>>,
}

impl ScriptedTicker {
    pub fn new<I>(instants: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        Self {
            instants: instants.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.instants.len()
    }
}

#[async_trait]
impl Ticker for ScriptedTicker {
    async fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        tokio::task::yield_now().await;
        self.instants.pop_front()
    }
}

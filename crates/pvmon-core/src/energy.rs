//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::NaiveDate;
use pvmon_common::time::{day_key, step_hours};
use pvmon_common::Observation;
use serde::Serialize;

use crate::performance::pr_daily;

/// Real and ideal energy since process start. Never decreases for
/// non-negative power.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnergyLedger {
    pub real_kwh: f64,
    pub ideal_kwh: f64,
}

impl EnergyLedger {
    pub fn add(&mut self, real_kw: f64, ideal_kw: f64, hours: f64) {
        self.real_kwh += real_kw * hours;
        self.ideal_kwh += ideal_kw * hours;
    }

    /// Real energy as a percentage of ideal energy; zero while ideal is zero.
    pub fn accuracy_pct(&self) -> f64 {
        if self.ideal_kwh > 0.0 {
            100.0 * self.real_kwh / self.ideal_kwh
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> EnergySnapshot {
        EnergySnapshot {
            real_kwh: self.real_kwh,
            ideal_kwh: self.ideal_kwh,
            accuracy_pct: self.accuracy_pct(),
        }
    }
}

/// Cumulative totals as emitted for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergySnapshot {
    pub real_kwh: f64,
    pub ideal_kwh: f64,
    pub accuracy_pct: f64,
}

/// Running daylight sums of one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyAccumulator {
    pub day: NaiveDate,
    pub energy_kwh: f64,
    pub irradiation_kwh_m2: f64,
}

impl DailyAccumulator {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            energy_kwh: 0.0,
            irradiation_kwh_m2: 0.0,
        }
    }
}

/// A finished day, ready for its daily PR point.
pub type CompletedDay = DailyAccumulator;

impl CompletedDay {
    pub fn performance_ratio(&self, capacity_kw: f64) -> Option<f64> {
        pr_daily(self.energy_kwh, capacity_kw, self.irradiation_kwh_m2)
    }
}

/// Energy bookkeeping shared by both execution modes so that they integrate
/// power identically.
#[derive(Debug, Clone)]
pub struct EnergyTracker {
    hours_per_tick: f64,
    ledger: EnergyLedger,
    current: Option<DailyAccumulator>,
}

impl EnergyTracker {
    pub fn new(step: Duration) -> Self {
        Self {
            hours_per_tick: step_hours(step),
            ledger: EnergyLedger::default(),
            current: None,
        }
    }

    pub fn ledger(&self) -> EnergyLedger {
        self.ledger
    }

    pub fn current_day(&self) -> Option<&DailyAccumulator> {
        self.current.as_ref()
    }

    /// Account one observation. The day rollover is detected before the tick's
    /// energy is added, so the returned day (if any) never contains it.
    pub fn record(&mut self, observation: &Observation) -> (EnergySnapshot, Option<CompletedDay>) {
        let today = day_key(observation.timestamp);
        let completed = match self.current {
            Some(acc) if acc.day == today => None,
            Some(acc) => {
                self.current = Some(DailyAccumulator::new(today));
                Some(acc)
            }
            None => {
                self.current = Some(DailyAccumulator::new(today));
                None
            }
        };

        if observation.day {
            if let Some(acc) = self.current.as_mut() {
                acc.energy_kwh += observation.total_ac_kw * self.hours_per_tick;
                acc.irradiation_kwh_m2 += observation.poa_wm2 / 1000.0 * self.hours_per_tick;
            }
        }
        self.ledger.add(
            observation.total_ac_kw,
            observation.ideal_total_kw,
            self.hours_per_tick,
        );
        (self.ledger.snapshot(), completed)
    }

    /// Close the open day, e.g. at the end of a backfill pass.
    pub fn finish(&mut self) -> Option<CompletedDay> {
        self.current.take()
    }
}

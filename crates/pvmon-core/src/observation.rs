//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use pvmon_common::{Observation, PlantConfig, Sample};
use pvmon_sim::{ModuleCatalog, PvArray};

use crate::performance::pr_instant;

/// Turns a raw [`Sample`] into an [`Observation`]. Both execution modes use
/// the same builder so their derived fields cannot diverge.
#[derive(Debug, Clone)]
pub struct ObservationBuilder {
    array: PvArray,
    derate: f64,
    sunny_threshold_wm2: f64,
    day_threshold_wm2: f64,
}

impl ObservationBuilder {
    pub fn new(array: PvArray, derate: f64, plant: &PlantConfig) -> Self {
        Self {
            array,
            derate,
            sunny_threshold_wm2: plant.sunny_threshold_wm2,
            day_threshold_wm2: plant.day_threshold_wm2,
        }
    }

    /// Resolve the configured module through `catalog` and build the array.
    pub fn array_for(plant: &PlantConfig, catalog: &dyn ModuleCatalog) -> PvArray {
        PvArray::new(
            catalog.lookup(&plant.module),
            plant.modules_per_inverter,
            plant.inverters,
        )
    }

    pub fn array(&self) -> &PvArray {
        &self.array
    }

    pub fn derate(&self) -> f64 {
        self.derate
    }

    pub fn set_derate(&mut self, derate: f64) {
        self.derate = derate;
    }

    pub fn nominal_capacity_kw(&self) -> f64 {
        self.array.nominal_capacity_kw()
    }

    pub fn build(&self, sample: &Sample) -> Observation {
        let poa = sample.poa_wm2;
        let total_ac_kw = sample.total_ac_kw();
        let ideal_per_inverter_kw =
            self.array
                .ideal_per_inverter_kw(poa, sample.cell_temp_c, self.derate);
        Observation {
            timestamp: sample.timestamp,
            poa_wm2: poa,
            total_ac_kw,
            ideal_per_inverter_kw,
            ideal_total_kw: ideal_per_inverter_kw * self.array.inverters as f64,
            pr_instant: pr_instant(
                total_ac_kw,
                self.nominal_capacity_kw(),
                poa,
                self.day_threshold_wm2,
            ),
            sunny: poa >= self.sunny_threshold_wm2,
            day: poa > self.day_threshold_wm2,
            cell_temp_c: sample.cell_temp_c,
            module_temp_c: sample.module_temp_c,
            inverters_kw: sample.inverters_kw.clone(),
        }
    }
}

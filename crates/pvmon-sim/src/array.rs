//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Photovoltaic module catalog and ideal power model."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use crate::catalog::ModuleConstants;

/// Cell temperature at which the STC rating applies, °C.
pub const REFERENCE_CELL_TEMP_C: f64 = 25.0;

/// Ideal AC output of one inverter's string set, kW.
///
/// Linear PVWatts model; inputs are not range checked, so implausible
/// irradiance or temperature extrapolate the line.
pub fn ideal_power_kw(
    poa_wm2: f64,
    cell_temp_c: f64,
    module: &ModuleConstants,
    modules_per_inverter: u32,
    derate: f64,
) -> f64 {
    let per_module_w = module.stc_w
        * (poa_wm2 / 1000.0)
        * (1.0 + (module.gamma_pct / 100.0) * (cell_temp_c - REFERENCE_CELL_TEMP_C));
    per_module_w * f64::from(modules_per_inverter) * derate / 1000.0
}

/// DC nameplate of the whole array, kW. Independent of derate.
pub fn array_nominal_capacity_kw(
    module: &ModuleConstants,
    modules_per_inverter: u32,
    inverters: usize,
) -> f64 {
    inverters as f64 * f64::from(modules_per_inverter) * module.stc_w / 1000.0
}

/// A plant's array: identical inverters each fed by the same number of modules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PvArray {
    pub module: ModuleConstants,
    pub modules_per_inverter: u32,
    pub inverters: usize,
}

impl PvArray {
    pub fn new(module: ModuleConstants, modules_per_inverter: u32, inverters: usize) -> Self {
        Self {
            module,
            modules_per_inverter,
            inverters,
        }
    }

    pub fn ideal_per_inverter_kw(&self, poa_wm2: f64, cell_temp_c: f64, derate: f64) -> f64 {
        ideal_power_kw(
            poa_wm2,
            cell_temp_c,
            &self.module,
            self.modules_per_inverter,
            derate,
        )
    }

    /// Array-wide ideal output: per-inverter ideal times the inverter count.
    pub fn ideal_total_kw(&self, poa_wm2: f64, cell_temp_c: f64, derate: f64) -> f64 {
        self.ideal_per_inverter_kw(poa_wm2, cell_temp_c, derate) * self.inverters as f64
    }

    pub fn nominal_capacity_kw(&self) -> f64 {
        array_nominal_capacity_kw(&self.module, self.modules_per_inverter, self.inverters)
    }
}

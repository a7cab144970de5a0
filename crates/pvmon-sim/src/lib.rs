//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Photovoltaic module catalog and ideal power model."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Physics side of pvmon: module constants and the ideal array output that
//! measured inverter power is compared against.

pub mod array;
pub mod catalog;

pub use array::{array_nominal_capacity_kw, ideal_power_kw, PvArray, REFERENCE_CELL_TEMP_C};
pub use catalog::{ModuleCatalog, ModuleConstants, StaticModuleCatalog};

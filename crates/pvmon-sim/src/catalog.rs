//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Photovoltaic module catalog and ideal power model."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use indexmap::IndexMap;
use pvmon_common::ModuleEntryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Constants of one module model needed by the ideal power formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleConstants {
    /// Power temperature coefficient, %/°C.
    pub gamma_pct: f64,
    /// Rated power at STC, W.
    pub stc_w: f64,
}

impl From<ModuleEntryConfig> for ModuleConstants {
    fn from(entry: ModuleEntryConfig) -> Self {
        Self {
            gamma_pct: entry.gamma_pct,
            stc_w: entry.stc_w,
        }
    }
}

/// Lookup of module constants by model name.
///
/// Unknown names never fail: implementations fall back to a deterministic
/// entry and report the substitution.
pub trait ModuleCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> ModuleConstants;
}

const BUILT_IN: &[(&str, ModuleConstants)] = &[
    (
        "Jinko_Solar_Co___Ltd_JKM320PP_72",
        ModuleConstants {
            gamma_pct: -0.418,
            stc_w: 320.0,
        },
    ),
    (
        "Canadian_Solar_Inc__CS6U_330P",
        ModuleConstants {
            gamma_pct: -0.41,
            stc_w: 330.0,
        },
    ),
    (
        "Trina_Solar_TSM_345DD14A_II_",
        ModuleConstants {
            gamma_pct: -0.39,
            stc_w: 345.0,
        },
    ),
    (
        "LONGi_Green_Energy_Technology_Co___Ltd__LR6_72HV_370M",
        ModuleConstants {
            gamma_pct: -0.37,
            stc_w: 370.0,
        },
    ),
];

/// Ordered in-memory catalog. Unknown names resolve to the first entry.
#[derive(Debug, Clone)]
pub struct StaticModuleCatalog {
    entries: IndexMap<String, ModuleConstants>,
}

impl StaticModuleCatalog {
    /// Built-in entries only.
    pub fn builtin() -> Self {
        Self {
            entries: BUILT_IN
                .iter()
                .map(|(name, constants)| ((*name).to_owned(), *constants))
                .collect(),
        }
    }

    /// Built-in entries followed by configured ones. A configured entry with a
    /// built-in name replaces the constants but keeps the built-in position.
    pub fn with_entries(extra: &IndexMap<String, ModuleEntryConfig>) -> Self {
        let mut catalog = Self::builtin();
        for (name, entry) in extra {
            catalog.entries.insert(name.clone(), (*entry).into());
        }
        catalog
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for StaticModuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModuleCatalog for StaticModuleCatalog {
    fn lookup(&self, name: &str) -> ModuleConstants {
        if let Some(constants) = self.entries.get(name) {
            return *constants;
        }
        match self.entries.first() {
            Some((fallback, constants)) => {
                warn!(
                    requested = name,
                    fallback = %fallback,
                    "unknown module name; using first catalog entry"
                );
                *constants
            }
            // The built-in table is never empty.
            None => BUILT_IN[0].1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_reference_module() {
        let catalog = StaticModuleCatalog::builtin();
        let constants = catalog.lookup("Jinko_Solar_Co___Ltd_JKM320PP_72");
        assert_eq!(constants.stc_w, 320.0);
    }

    #[test]
    fn unknown_name_falls_back_to_first_entry() {
        let catalog = StaticModuleCatalog::builtin();
        let first = catalog.names().next().unwrap().to_owned();
        assert_eq!(catalog.lookup("does-not-exist"), catalog.lookup(&first));
        // repeated lookups are stable
        assert_eq!(catalog.lookup("other"), catalog.lookup("does-not-exist"));
    }

    #[test]
    fn configured_entries_extend_catalog() {
        let mut extra = IndexMap::new();
        extra.insert(
            "Custom_400".to_owned(),
            ModuleEntryConfig {
                gamma_pct: -0.30,
                stc_w: 400.0,
            },
        );
        let catalog = StaticModuleCatalog::with_entries(&extra);
        assert!(catalog.contains("Custom_400"));
        assert_eq!(catalog.lookup("Custom_400").stc_w, 400.0);
        assert_eq!(catalog.names().last(), Some("Custom_400"));
        assert_eq!(
            catalog.names().next(),
            Some("Jinko_Solar_Co___Ltd_JKM320PP_72")
        );
    }
}

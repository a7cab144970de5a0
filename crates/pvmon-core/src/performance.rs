//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Primary orchestration and lifecycle management."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
/// Upper clamp applied to every PR value.
pub const PR_CEILING: f64 = 1.5;

fn clamp_pr(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, PR_CEILING)
}

/// Instantaneous PR: measured power over nameplate scaled by irradiance.
/// Zero unless irradiance exceeds the day threshold and the capacity is positive.
pub fn pr_instant(total_ac_kw: f64, capacity_kw: f64, poa_wm2: f64, day_threshold_wm2: f64) -> f64 {
    if poa_wm2 > day_threshold_wm2 && capacity_kw > 0.0 {
        clamp_pr(total_ac_kw / (capacity_kw * (poa_wm2 / 1000.0)))
    } else {
        0.0
    }
}

/// Daily PR from produced energy (kWh) and irradiation (kWh/m²), or `None`
/// when the day carries no irradiation or the capacity is unknown.
pub fn pr_daily(energy_kwh: f64, capacity_kw: f64, irradiation_kwh_m2: f64) -> Option<f64> {
    if irradiation_kwh_m2 > 0.0 && capacity_kw > 0.0 {
        Some(clamp_pr(energy_kwh / capacity_kw / irradiation_kwh_m2))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn instant_pr_matches_definition() {
        assert_relative_eq!(pr_instant(80.0, 100.0, 1000.0, 20.0), 0.8);
        assert_relative_eq!(pr_instant(40.0, 100.0, 500.0, 20.0), 0.8);
    }

    #[test]
    fn instant_pr_is_zero_at_night_or_without_capacity() {
        assert_eq!(pr_instant(5.0, 100.0, 20.0, 20.0), 0.0);
        assert_eq!(pr_instant(5.0, 0.0, 800.0, 20.0), 0.0);
    }

    #[test]
    fn instant_pr_stays_within_bounds() {
        for total in [-50.0, 0.0, 10.0, 1e6, f64::INFINITY] {
            for poa in [21.0, 300.0, 1200.0] {
                let pr = pr_instant(total, 100.0, poa, 20.0);
                assert!((0.0..=PR_CEILING).contains(&pr), "pr {pr} for {total} kW at {poa}");
            }
        }
    }

    #[test]
    fn daily_pr_requires_irradiation() {
        assert_eq!(pr_daily(100.0, 100.0, 0.0), None);
        assert_eq!(pr_daily(100.0, 0.0, 5.0), None);
        assert_relative_eq!(pr_daily(450.0, 100.0, 5.0).unwrap(), 0.9);
        assert_eq!(pr_daily(10_000.0, 100.0, 5.0), Some(PR_CEILING));
    }
}

//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Derate calibration by robust regression of real against ideal power."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Scalar regression through the origin: `pac ≈ d · y`.

use serde::Serialize;

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Least-squares slope through the origin. Returns 1.0 when `y` carries no
/// energy (`y·y <= 0`).
pub fn ols_closed_form(y: &[f64], pac: &[f64]) -> f64 {
    let y2 = dot(y, y);
    if y2 <= 0.0 {
        return 1.0;
    }
    dot(y, pac) / y2
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuberSettings {
    /// Residual magnitude (kW) beyond which a point is down-weighted.
    pub delta: f64,
    pub max_iterations: usize,
    /// Relative convergence tolerance on the slope.
    pub tolerance: f64,
}

impl Default for HuberSettings {
    fn default() -> Self {
        Self {
            delta: 1.5,
            max_iterations: 50,
            tolerance: 1e-8,
        }
    }
}

/// Result of the IRLS refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuberFit {
    pub estimate: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Huber-robust slope via iteratively reweighted least squares, seeded with
/// `seed`. A non-positive weighted denominator stops the refinement and keeps
/// the last estimate.
pub fn huber_irls(y: &[f64], pac: &[f64], settings: &HuberSettings, seed: f64) -> HuberFit {
    let mut d = seed;
    let mut weighted = vec![0.0; y.len()];
    for iteration in 1..=settings.max_iterations {
        for ((w, yi), pi) in weighted.iter_mut().zip(y).zip(pac) {
            let residual = (d * yi - pi).abs();
            let weight = if residual <= settings.delta {
                1.0
            } else {
                settings.delta / residual
            };
            *w = weight * yi;
        }
        let denominator = dot(y, &weighted);
        if denominator <= 0.0 {
            return HuberFit {
                estimate: d,
                iterations: iteration,
                converged: false,
            };
        }
        let next = dot(&weighted, pac) / denominator;
        if (next - d).abs() <= settings.tolerance * d.abs().max(1.0) {
            return HuberFit {
                estimate: next,
                iterations: iteration,
                converged: true,
            };
        }
        d = next;
    }
    HuberFit {
        estimate: d,
        iterations: settings.max_iterations,
        converged: false,
    }
}

/// Goodness of fit of `pac` against `d · y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitStatistics {
    pub sse: f64,
    pub rmse: f64,
    pub r2: f64,
    pub mape_pct: f64,
}

pub fn fit_statistics(y: &[f64], pac: &[f64], d: f64) -> FitStatistics {
    let n = pac.len();
    if n == 0 {
        return FitStatistics {
            sse: 0.0,
            rmse: f64::NAN,
            r2: 0.0,
            mape_pct: f64::NAN,
        };
    }
    let mean = pac.iter().sum::<f64>() / n as f64;
    let mut sse = 0.0;
    let mut sst = 0.0;
    let mut ape = 0.0;
    for (yi, pi) in y.iter().zip(pac) {
        let residual = pi - d * yi;
        sse += residual * residual;
        sst += (pi - mean) * (pi - mean);
        ape += residual.abs() / pi.abs().max(1e-9);
    }
    FitStatistics {
        sse,
        rmse: (sse / n as f64).sqrt(),
        r2: if sst > 0.0 { 1.0 - sse / sst } else { 0.0 },
        mape_pct: ape / n as f64 * 100.0,
    }
}

// Two-sided normal-approximation power
//
// power = Φ(|effect| / se − z_{1−α/2})
//
// continuous: se = sp·sqrt(2/n)
// binary:     se = sqrt(p1(1−p1)/n + p2(1−p2)/n)

use super::endpoint::EndpointStats;
use crate::plan::PowerSpec;
use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erf_inv};
use std::f64::consts::SQRT_2;

/// Φ⁻¹(0.975), the two-sided 95% critical value
pub const Z_975: f64 = 1.959_963_984_540_054;

/// Standard normal CDF
pub fn normal_cdf(x: f64) -> f64 {
    if x == f64::INFINITY {
        return 1.0;
    }
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile, `p` in (0, 1)
pub fn normal_quantile(p: f64) -> f64 {
    SQRT_2 * erf_inv(2.0 * p - 1.0)
}

fn two_sided_power(effect: f64, se: f64, alpha: f64) -> f64 {
    let z_alpha = normal_quantile(1.0 - alpha / 2.0);
    // se may be 0 for degenerate samples; 0/0 is taken as no signal
    let ratio = if effect == 0.0 { 0.0 } else { effect.abs() / se };
    normal_cdf(ratio - z_alpha)
}

/// Power to detect `effect` given pooled SD `sp` and `n` subjects per arm
pub fn power_normal(effect: f64, sp: f64, n: u32, alpha: f64) -> f64 {
    let se = sp * (2.0 / f64::from(n)).sqrt();
    two_sided_power(effect, se, alpha)
}

/// Power to detect a difference between proportions `p1` and `p2`
pub fn power_binary(p1: f64, p2: f64, n: u32, alpha: f64) -> f64 {
    let n = f64::from(n);
    let se = (p1 * (1.0 - p1) / n + p2 * (1.0 - p2) / n).sqrt();
    two_sided_power(p2 - p1, se, alpha)
}

/// Achieved power, or an explicit marker that it was not computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PowerEstimate {
    Computed { value: f64 },
    NotImplemented { reason: String },
}

impl PowerEstimate {
    pub fn value(&self) -> Option<f64> {
        match self {
            PowerEstimate::Computed { value } => Some(*value),
            PowerEstimate::NotImplemented { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, PowerEstimate::Computed { .. })
    }
}

/// Inputs the power calculation holds fixed while `n_per_arm` varies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerModel {
    Normal { effect: f64, sp: f64 },
    Binary { p1: f64, p2: f64 },
    Unsupported,
}

impl PowerModel {
    /// Observed statistics, overridden by any assumption the plan states
    pub fn from_stats(stats: &EndpointStats, spec: &PowerSpec) -> Self {
        match stats {
            EndpointStats::Continuous(s) => PowerModel::Normal {
                effect: spec.effect_assumed.unwrap_or(s.delta),
                sp: s.sp,
            },
            EndpointStats::Binary(s) => PowerModel::Binary {
                p1: spec.p1_assumed.unwrap_or(s.p1),
                p2: spec.p2_assumed.unwrap_or(s.p2),
            },
            EndpointStats::TimeToEvent(_) => PowerModel::Unsupported,
        }
    }

    pub fn estimate(&self, n_per_arm: u32, alpha: f64) -> PowerEstimate {
        match *self {
            PowerModel::Normal { effect, sp } => PowerEstimate::Computed {
                value: power_normal(effect, sp, n_per_arm, alpha),
            },
            PowerModel::Binary { p1, p2 } => PowerEstimate::Computed {
                value: power_binary(p1, p2, n_per_arm, alpha),
            },
            PowerModel::Unsupported => PowerEstimate::NotImplemented {
                reason: "power for time_to_event endpoints is not implemented".to_string(),
            },
        }
    }
}

//! Single-shot sample-size autotune
//!
//! ```text
//! Evaluated ──(enabled ∧ power < target)──▶ Retuned ──▶ done
//!     └──────────────(otherwise)──────────────────────▶ done
//! ```
//!
//! Retuning multiplies `n_per_arm` by the growth factor, floors it, and
//! recomputes power once. There is no iteration toward the target.

use crate::plan::{AutotuneSpec, PowerSpec};
use crate::stats::{PowerEstimate, PowerModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_GROWTH_FACTOR: f64 = 1.15;

/// Terminal state of the autotune controller, persisted with the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AutotuneRecord {
    /// Power evaluated once; no retune
    Evaluated,
    /// `n_per_arm` raised from `from` to `to` and power recomputed
    Retuned { from: u32, to: u32 },
    /// Enabled, but power was not computed for this endpoint
    Skipped { reason: String },
}

impl AutotuneRecord {
    /// Sample size the run finished with, if the controller changed it
    pub fn tuned_n_per_arm(&self) -> Option<u32> {
        match self {
            AutotuneRecord::Retuned { to, .. } => Some(*to),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Autotuned {
    pub power: PowerEstimate,
    pub record: AutotuneRecord,
    pub note: Option<String>,
}

/// `floor(n × factor)`, saturating at `u32::MAX`
pub fn grow(n_per_arm: u32, factor: f64) -> u32 {
    (f64::from(n_per_arm) * factor).floor() as u32
}

/// Evaluate power and retune `power.n_per_arm` at most once
pub fn autotune(model: &PowerModel, power: &mut PowerSpec, policy: &AutotuneSpec) -> Autotuned {
    let first = model.estimate(power.n_per_arm, power.alpha);

    if !policy.enable {
        return Autotuned {
            power: first,
            record: AutotuneRecord::Evaluated,
            note: None,
        };
    }

    let Some(value) = first.value() else {
        debug!("autotune skipped: power not computed");
        return Autotuned {
            power: first,
            record: AutotuneRecord::Skipped {
                reason: "power not computed for this endpoint".to_string(),
            },
            note: Some("autotune skipped: power not computed".to_string()),
        };
    };

    if value >= power.target {
        return Autotuned {
            power: first,
            record: AutotuneRecord::Evaluated,
            note: None,
        };
    }

    let from = power.n_per_arm;
    let to = grow(from, policy.growth_factor());
    power.n_per_arm = to;
    let retuned = model.estimate(to, power.alpha);
    info!(
        from,
        to,
        before = value,
        after = ?retuned.value(),
        "autotune applied"
    );

    Autotuned {
        power: retuned,
        record: AutotuneRecord::Retuned { from, to },
        note: Some(format!("autotune applied: n_per_arm -> {to}")),
    }
}

// Kaplan-Meier survivor function
//
// At each distinct observed time t with d events among n subjects still at
// risk, S(t) = S(t−) · (1 − d/n). Censored subjects leave the risk set after
// their time without contributing an event.

use crate::error::{EvidenceError, Result};

/// Step function: `(time, S(time))` at each distinct observed time
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalCurve {
    pub steps: Vec<(f64, f64)>,
}

/// Fit the Kaplan-Meier estimator over `(time, event)` pairs
pub fn kaplan_meier(times: &[f64], events: &[bool]) -> Result<SurvivalCurve> {
    if times.len() != events.len() {
        return Err(EvidenceError::Data(format!(
            "{} times but {} event flags",
            times.len(),
            events.len()
        )));
    }
    if let Some(bad) = times.iter().find(|t| !t.is_finite() || **t < 0.0) {
        return Err(EvidenceError::Data(format!(
            "survival times must be finite and non-negative, got {bad}"
        )));
    }

    let mut pairs: Vec<(f64, bool)> = times.iter().copied().zip(events.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut at_risk = pairs.len();
    let mut survival = 1.0;
    let mut steps = Vec::new();
    let mut i = 0;
    while i < pairs.len() {
        let t = pairs[i].0;
        let mut deaths = 0usize;
        let mut leaving = 0usize;
        while i < pairs.len() && pairs[i].0 == t {
            if pairs[i].1 {
                deaths += 1;
            }
            leaving += 1;
            i += 1;
        }
        if deaths > 0 {
            survival *= 1.0 - deaths as f64 / at_risk as f64;
        }
        steps.push((t, survival));
        at_risk -= leaving;
    }

    Ok(SurvivalCurve { steps })
}

impl SurvivalCurve {
    /// Smallest time with S(t) ≤ 0.5; `None` when the curve never gets there
    pub fn median(&self) -> Option<f64> {
        self.steps
            .iter()
            .find(|(_, s)| *s <= 0.5)
            .map(|(t, _)| *t)
    }
}

pub fn median_survival(times: &[f64], events: &[bool]) -> Result<Option<f64>> {
    Ok(kaplan_meier(times, events)?.median())
}

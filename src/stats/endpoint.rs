// Per-endpoint summary statistics over two cohorts

use super::power::Z_975;
use super::survival::median_survival;
use crate::dataset::Dataset;
use crate::error::{EvidenceError, Result};
use crate::filter::RowMask;
use crate::plan::Endpoint;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousStats {
    pub mean_baseline: f64,
    pub mean_proposed: f64,
    pub sd_baseline: f64,
    pub sd_proposed: f64,
    /// mean_proposed − mean_baseline
    pub delta: f64,
    /// 95% normal CI around `delta`
    pub ci: [f64; 2],
    /// Pooled standard deviation
    pub sp: f64,
    pub se: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryStats {
    pub p1: f64,
    pub p2: f64,
    /// p2 − p1
    pub delta: f64,
    pub ci: [f64; 2],
    pub se: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalStats {
    pub median_baseline: Option<f64>,
    pub median_proposed: Option<f64>,
    pub events_baseline: usize,
    pub events_proposed: usize,
}

/// Statistics record, one shape per endpoint kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointStats {
    Continuous(ContinuousStats),
    Binary(BinaryStats),
    TimeToEvent(SurvivalStats),
}

impl EndpointStats {
    /// Point estimate of the difference, where one is defined
    pub fn delta(&self) -> Option<f64> {
        match self {
            EndpointStats::Continuous(s) => Some(s.delta),
            EndpointStats::Binary(s) => Some(s.delta),
            EndpointStats::TimeToEvent(_) => None,
        }
    }
}

fn normal_ci(delta: f64, se: f64) -> [f64; 2] {
    [delta - Z_975 * se, delta + Z_975 * se]
}

fn ensure_finite(label: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvidenceError::Data(format!("{label} is undefined")))
    }
}

/// Two-sample comparison of a continuous endpoint
///
/// Needs at least two rows per cohort for the n−1 variance divisor.
pub fn continuous_stats(baseline: &[f64], proposed: &[f64]) -> Result<ContinuousStats> {
    for (cohort, values) in [("baseline", baseline), ("proposed", proposed)] {
        if values.len() < 2 {
            return Err(EvidenceError::Data(format!(
                "{cohort} cohort has {} rows; at least 2 are needed for a variance estimate",
                values.len()
            )));
        }
    }

    let (n1, n2) = (baseline.len() as f64, proposed.len() as f64);
    let mean_baseline = baseline.iter().mean();
    let mean_proposed = proposed.iter().mean();
    let sd_baseline = baseline.iter().std_dev();
    let sd_proposed = proposed.iter().std_dev();

    let delta = mean_proposed - mean_baseline;
    let sp = (((n1 - 1.0) * sd_baseline.powi(2) + (n2 - 1.0) * sd_proposed.powi(2))
        / (n1 + n2 - 2.0))
        .sqrt();
    let se = sp * (1.0 / n1 + 1.0 / n2).sqrt();

    Ok(ContinuousStats {
        mean_baseline: ensure_finite("baseline mean", mean_baseline)?,
        mean_proposed: ensure_finite("proposed mean", mean_proposed)?,
        sd_baseline,
        sd_proposed,
        delta,
        ci: normal_ci(delta, se),
        sp: ensure_finite("pooled standard deviation", sp)?,
        se,
    })
}

/// Difference in proportions over 0/1 outcomes
pub fn binary_stats(baseline: &[f64], proposed: &[f64]) -> Result<BinaryStats> {
    for (cohort, values) in [("baseline", baseline), ("proposed", proposed)] {
        if values.is_empty() {
            return Err(EvidenceError::Data(format!(
                "{cohort} cohort is empty; proportion is undefined"
            )));
        }
        if let Some(bad) = values.iter().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(EvidenceError::Data(format!(
                "binary endpoint values must be 0 or 1, got {bad} in {cohort} cohort"
            )));
        }
    }

    let (n1, n2) = (baseline.len() as f64, proposed.len() as f64);
    let p1 = baseline.iter().mean();
    let p2 = proposed.iter().mean();
    let delta = p2 - p1;
    let se = (p1 * (1.0 - p1) / n1 + p2 * (1.0 - p2) / n2).sqrt();

    Ok(BinaryStats {
        p1,
        p2,
        delta,
        ci: normal_ci(delta, se),
        se,
    })
}

/// Endpoint values for the rows a cohort selected; a missing cell is an error
fn cohort_values(dataset: &Dataset, column: &str, mask: &RowMask, cohort: &str) -> Result<Vec<f64>> {
    let data = dataset
        .column(column)
        .ok_or_else(|| EvidenceError::config("endpoint.value", format!("unknown column {column}")))?;

    let mut values = Vec::with_capacity(mask.count());
    let mut missing = 0usize;
    for row in mask.indices() {
        match data.number(row) {
            Some(value) => values.push(value),
            None => missing += 1,
        }
    }
    if missing > 0 {
        return Err(EvidenceError::Data(format!(
            "{missing} rows of the {cohort} cohort have no value in endpoint column {column}"
        )));
    }
    Ok(values)
}

fn cohort_events(dataset: &Dataset, column: &str, mask: &RowMask, cohort: &str) -> Result<Vec<bool>> {
    cohort_values(dataset, column, mask, cohort)?
        .into_iter()
        .map(|v| {
            if v == 0.0 || v == 1.0 {
                Ok(v == 1.0)
            } else {
                Err(EvidenceError::Data(format!(
                    "event column {column} must be 0/1, got {v} in {cohort} cohort"
                )))
            }
        })
        .collect()
}

/// Endpoint statistics for the baseline and proposed selections
pub fn compute(
    endpoint: &Endpoint,
    dataset: &Dataset,
    baseline: &RowMask,
    proposed: &RowMask,
) -> Result<EndpointStats> {
    match endpoint {
        Endpoint::Continuous { column } => {
            let a = cohort_values(dataset, column, baseline, "baseline")?;
            let b = cohort_values(dataset, column, proposed, "proposed")?;
            continuous_stats(&a, &b).map(EndpointStats::Continuous)
        }
        Endpoint::Binary { column } => {
            let a = cohort_values(dataset, column, baseline, "baseline")?;
            let b = cohort_values(dataset, column, proposed, "proposed")?;
            binary_stats(&a, &b).map(EndpointStats::Binary)
        }
        Endpoint::TimeToEvent { time, event } => {
            let mut medians = Vec::with_capacity(2);
            let mut event_counts = Vec::with_capacity(2);
            for (cohort, mask) in [("baseline", baseline), ("proposed", proposed)] {
                let times = cohort_values(dataset, time, mask, cohort)?;
                let events = cohort_events(dataset, event, mask, cohort)?;
                if times.is_empty() {
                    return Err(EvidenceError::Data(format!(
                        "{cohort} cohort is empty; survival curve is undefined"
                    )));
                }
                event_counts.push(events.iter().filter(|e| **e).count());
                medians.push(median_survival(&times, &events)?);
            }
            Ok(EndpointStats::TimeToEvent(SurvivalStats {
                median_baseline: medians[0],
                median_proposed: medians[1],
                events_baseline: event_counts[0],
                events_proposed: event_counts[1],
            }))
        }
    }
}

//! Subgroup count tables with small-cell suppression
//!
//! For each subgroup column, category counts are tabulated in both cohorts,
//! outer-joined (absent = 0), and compared. A record whose proposed-cohort
//! count is below `k` keeps its label, baseline count and delta, but its
//! proposed count and percentage are blanked.

use crate::dataset::{DataDict, Dataset};
use crate::error::{EvidenceError, Result};
use crate::filter::RowMask;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Unsuppressed per-category counts for one subgroup column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub baseline: u64,
    pub proposed: u64,
}

/// One row of a published fairness table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessRecord {
    pub category: String,
    pub baseline: u64,
    /// `None` when suppressed
    pub proposed: Option<u64>,
    /// proposed − baseline
    pub delta: i64,
    /// Share of the proposed cohort, in percent; `None` when suppressed
    pub pct: Option<f64>,
}

impl FairnessRecord {
    pub fn is_suppressed(&self) -> bool {
        self.proposed.is_none()
    }
}

/// Subgroup column → records, in subgroup declaration order
pub type FairnessTable = IndexMap<String, Vec<FairnessRecord>>;

/// Count categories of `column` in both cohorts
///
/// Categories declared in `declared` come first, in that order; the rest
/// follow in order of first appearance (baseline rows, then proposed rows).
/// Missing cells are not counted.
pub fn tabulate(
    dataset: &Dataset,
    column: &str,
    baseline: &RowMask,
    proposed: &RowMask,
    declared: &[String],
) -> Result<Vec<CategoryCount>> {
    let data = dataset.column(column).ok_or_else(|| {
        EvidenceError::config("fairness.subgroups", format!("unknown column {column}"))
    })?;

    let mut counts: IndexMap<String, (u64, u64)> = declared
        .iter()
        .map(|category| (category.clone(), (0, 0)))
        .collect();

    for row in baseline.indices() {
        if let Some(label) = data.label(row) {
            counts.entry(label).or_default().0 += 1;
        }
    }
    for row in proposed.indices() {
        if let Some(label) = data.label(row) {
            counts.entry(label).or_default().1 += 1;
        }
    }

    Ok(counts
        .into_iter()
        .filter(|(_, (b, p))| *b > 0 || *p > 0)
        .map(|(category, (baseline, proposed))| CategoryCount {
            category,
            baseline,
            proposed,
        })
        .collect())
}

/// Apply the small-cell rule to one subgroup's counts
pub fn suppress_small_cells(
    counts: Vec<CategoryCount>,
    total_proposed: usize,
    k: u32,
) -> Vec<FairnessRecord> {
    counts
        .into_iter()
        .map(|c| {
            let delta = c.proposed as i64 - c.baseline as i64;
            if c.proposed < u64::from(k) || total_proposed == 0 {
                FairnessRecord {
                    category: c.category,
                    baseline: c.baseline,
                    proposed: None,
                    delta,
                    pct: None,
                }
            } else {
                FairnessRecord {
                    category: c.category,
                    baseline: c.baseline,
                    proposed: Some(c.proposed),
                    delta,
                    pct: Some(c.proposed as f64 * 100.0 / total_proposed as f64),
                }
            }
        })
        .collect()
}

/// Build the suppressed fairness table for every configured subgroup
pub fn fairness(
    dataset: &Dataset,
    baseline: &RowMask,
    proposed: &RowMask,
    subgroups: &[String],
    dict: Option<&DataDict>,
    k: u32,
) -> Result<FairnessTable> {
    if k == 0 {
        return Err(EvidenceError::config("privacy.small_cell_k", "must be >= 1"));
    }

    let mut table = FairnessTable::new();
    for column in subgroups {
        let declared = dict.and_then(|d| d.categories(column)).unwrap_or(&[]);
        let counts = tabulate(dataset, column, baseline, proposed, declared)?;
        let records = suppress_small_cells(counts, proposed.count(), k);
        let suppressed = records.iter().filter(|r| r.is_suppressed()).count();
        debug!(column = %column, categories = records.len(), suppressed, "fairness table");
        table.insert(column.clone(), records);
    }
    Ok(table)
}

//! Plan execution and finalization
//!
//! `execute` runs the pure pipeline over an in-memory dataset and persists
//! `results.json`; `finalize` stamps the run with a provenance manifest and
//! runs for fresh and replayed executions alike.

use crate::autotune::{autotune, AutotuneRecord};
use crate::cache::write_atomic;
use crate::dataset::{DataDict, Dataset};
use crate::error::{EvidenceError, Result};
use crate::fairness::{fairness, FairnessTable};
use crate::filter::{evaluate, RowMask};
use crate::plan::AnalysisPlan;
use crate::provenance::{now_secs, sha256_file, sha256_text, Environment, Manifest, ManifestBody};
use crate::stats::{self, EndpointStats, PowerEstimate, PowerModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const RESULTS_FILE: &str = "results.json";

/// Baseline and proposed row selections; overlap is allowed
#[derive(Debug, Clone, PartialEq)]
pub struct CohortSplit {
    pub baseline: RowMask,
    pub proposed: RowMask,
}

pub fn split_cohorts(plan: &AnalysisPlan, dataset: &Dataset) -> Result<CohortSplit> {
    Ok(CohortSplit {
        baseline: evaluate(dataset, plan.baseline())?,
        proposed: evaluate(dataset, plan.proposed())?,
    })
}

/// Everything a run computed; written once, never modified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsBundle {
    pub n_baseline: usize,
    pub n_proposed: usize,
    pub stats: EndpointStats,
    pub power: PowerEstimate,
    pub autotune: AutotuneRecord,
    pub fairness: FairnessTable,
}

impl ResultsBundle {
    pub fn write(&self, run_dir: &Path) -> Result<PathBuf> {
        let path = run_dir.join(RESULTS_FILE);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| EvidenceError::storage("failed to encode results", e))?;
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    pub fn read(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(RESULTS_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|e| EvidenceError::storage(format!("failed to read {RESULTS_FILE}"), e))?;
        serde_json::from_str(&text)
            .map_err(|e| EvidenceError::storage(format!("corrupt {RESULTS_FILE}"), e))
    }

    /// Re-apply the sample size the original run ended with
    pub fn restore_plan(&self, plan: &mut AnalysisPlan) {
        if let Some(n) = self.autotune.tuned_n_per_arm() {
            plan.analysis.power.n_per_arm = n;
        }
    }
}

/// Run the plan against `dataset` and persist `results.json` in `run_dir`
///
/// `plan.analysis.power.n_per_arm` may be raised by autotune. Returned notes
/// are human-readable execution remarks.
pub fn execute(
    plan: &mut AnalysisPlan,
    dataset: &Dataset,
    dict: Option<&DataDict>,
    run_dir: &Path,
    small_cell_default: u32,
) -> Result<(ResultsBundle, Vec<String>)> {
    plan.validate_against(dataset)?;

    let split = split_cohorts(plan, dataset)?;
    let (n_baseline, n_proposed) = (split.baseline.count(), split.proposed.count());
    debug!(n_baseline, n_proposed, "cohorts selected");

    let stats = stats::compute(&plan.endpoint, dataset, &split.baseline, &split.proposed)?;
    let model = PowerModel::from_stats(&stats, &plan.analysis.power);
    let tuned = autotune(&model, &mut plan.analysis.power, &plan.policy.autotune);

    let mut notes = Vec::new();
    if let PowerEstimate::NotImplemented { reason } = &tuned.power {
        notes.push(format!("power not computed: {reason}"));
    }
    notes.extend(tuned.note);

    let fairness = fairness(
        dataset,
        &split.baseline,
        &split.proposed,
        &plan.fairness.subgroups,
        dict,
        plan.small_cell_k(small_cell_default),
    )?;

    let results = ResultsBundle {
        n_baseline,
        n_proposed,
        stats,
        power: tuned.power,
        autotune: tuned.record,
        fairness,
    };

    fs::create_dir_all(run_dir)
        .map_err(|e| EvidenceError::storage("failed to create run directory", e))?;
    results.write(run_dir)?;
    info!(
        n_baseline,
        n_proposed,
        power = ?results.power.value(),
        "results written"
    );
    Ok((results, notes))
}

/// Hash the final plan and dataset bytes into a sealed `manifest.json`
pub fn finalize(
    plan: &AnalysisPlan,
    dataset_path: &Path,
    run_dir: &Path,
    start_time: f64,
) -> Result<Manifest> {
    let body = ManifestBody {
        plan_hash: sha256_text(&plan.to_json_string()?),
        dataset_hash: sha256_file(dataset_path)?,
        seed: plan.seed,
        start_time,
        end_time: now_secs(),
        environment: Environment::current(),
    };
    let manifest = Manifest::seal(body)?;
    manifest.write(run_dir)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnData;
    use serde_json::json;
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        let score = (0..40).map(|i| Some(20.0 + (i % 10) as f64)).collect();
        let y = (0..40).map(|i| Some((i % 10) as f64 * 0.1 + (i % 3) as f64)).collect();
        let sex = (0..40)
            .map(|i| Some(if i % 4 == 0 { "F" } else { "M" }.to_string()))
            .collect();
        Dataset::from_columns([
            ("score", ColumnData::Numeric(score)),
            ("y", ColumnData::Numeric(y)),
            ("sex", ColumnData::Categorical(sex)),
        ])
        .unwrap()
    }

    fn plan(autotune: bool) -> AnalysisPlan {
        AnalysisPlan::from_json_value(json!({
            "question": "q",
            "dataset": {"uri": "local://data/data.csv", "dict": "local://data/data_dict.yaml"},
            "cohorts": {
                "baseline": {"col": "score", "op": ">=", "val": 26},
                "proposed": {"col": "score", "op": ">=", "val": 24}
            },
            "endpoint": {"type": "continuous", "value": "y"},
            "analysis": {
                "stats": ["mean_diff"],
                "power": {"method": "normal_approx", "alpha": 0.05, "n_per_arm": 50, "target": 0.99}
            },
            "fairness": {"subgroups": ["sex"]},
            "policy": {"autotune": {"enable": autotune}},
            "seed": 3
        }))
        .unwrap()
    }

    #[test]
    fn test_execute_writes_results() {
        let dir = TempDir::new().unwrap();
        let mut plan = plan(false);
        let (results, notes) = execute(&mut plan, &dataset(), None, dir.path(), 10).unwrap();

        assert_eq!(results.n_baseline, 16);
        assert_eq!(results.n_proposed, 24);
        assert!(notes.is_empty());
        assert_eq!(plan.analysis.power.n_per_arm, 50);

        let back = ResultsBundle::read(dir.path()).unwrap();
        assert_eq!(back.n_proposed, results.n_proposed);
        assert_eq!(back.autotune, results.autotune);
        assert_eq!(back.fairness["sex"].len(), results.fairness["sex"].len());
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap())
                .unwrap();
        assert_eq!(json["stats"]["type"], "continuous");
        assert_eq!(json["power"]["status"], "computed");
        assert!(json["fairness"]["sex"].is_array());
    }

    #[test]
    fn test_execute_autotune_mutates_plan_and_notes() {
        let dir = TempDir::new().unwrap();
        let mut plan = plan(true);
        let (results, notes) = execute(&mut plan, &dataset(), None, dir.path(), 10).unwrap();

        assert_eq!(plan.analysis.power.n_per_arm, 57);
        assert_eq!(notes, vec!["autotune applied: n_per_arm -> 57".to_string()]);

        let mut fresh = self::plan(true);
        results.restore_plan(&mut fresh);
        assert_eq!(fresh.analysis.power.n_per_arm, 57);
    }

    #[test]
    fn test_execute_rejects_unknown_column_before_stats() {
        let dir = TempDir::new().unwrap();
        let mut plan = plan(false);
        plan.fairness.subgroups.push("age_band".to_string());
        let err = execute(&mut plan, &dataset(), None, dir.path(), 10).unwrap_err();
        assert!(matches!(err, EvidenceError::Configuration(_)));
        assert!(!dir.path().join(RESULTS_FILE).exists());
    }

    #[test]
    fn test_finalize_hashes_final_plan() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data.csv");
        fs::write(&data, "score\n1\n").unwrap();
        let plan = plan(false);

        let manifest = finalize(&plan, &data, dir.path(), 1.0).unwrap();
        assert_eq!(
            manifest.body.plan_hash,
            sha256_text(&plan.to_json_string().unwrap())
        );
        assert_eq!(manifest.body.dataset_hash, sha256_text("score\n1\n"));
        assert_eq!(manifest.body.seed, 3);
        assert!(manifest.body.end_time >= manifest.body.start_time);
        assert!(dir.path().join("manifest.json").exists());
    }
}

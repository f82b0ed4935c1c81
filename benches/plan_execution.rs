//! Plan execution benchmark
//!
//! Measures the in-memory pipeline that every fresh run pays for: cohort
//! filter evaluation, endpoint statistics, and the full `execute` call
//! including fairness tables and the `results.json` write.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench plan_execution
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use evidentia::dataset::{DataDict, Dataset};
use evidentia::executor::{execute, split_cohorts};
use evidentia::filter::evaluate;
use evidentia::plan::AnalysisPlan;
use evidentia::{stats, synth};
use serde_json::json;
use tempfile::TempDir;

fn bench_plan() -> AnalysisPlan {
    AnalysisPlan::from_json_value(json!({
        "question": "bench",
        "dataset": {"uri": "local://data/data.csv", "dict": "local://data/data_dict.yaml"},
        "cohorts": {
            "baseline": {"and": [
                {"col": "score", "op": ">=", "val": 26},
                {"col": "sex", "op": "in", "val": ["F", "M"]}
            ]},
            "proposed": {"or": [
                {"col": "score", "op": ">=", "val": 24},
                {"not": {"col": "age", "op": "between", "val": [50, 80]}}
            ]}
        },
        "endpoint": {"type": "continuous", "value": "endpoint_value"},
        "analysis": {
            "stats": ["mean_diff"],
            "power": {"method": "normal_approx", "alpha": 0.05, "n_per_arm": 150, "target": 0.8}
        },
        "fairness": {"subgroups": ["sex", "age_band"]},
        "policy": {"autotune": {"enable": true}},
        "privacy": {"small_cell_k": 10},
        "seed": 0
    }))
    .unwrap()
}

fn load(dir: &TempDir, rows: usize) -> (Dataset, DataDict) {
    let data_dir = dir.path().join(format!("rows_{rows}"));
    let dict_path = synth::generate(&data_dir, rows, 0).unwrap();
    let dict = DataDict::from_file(&dict_path).unwrap();
    let dataset = Dataset::from_csv_path(&dict.data_path(&dict_path).unwrap()).unwrap();
    (dataset, dict)
}

/// Benchmark: cohort filter evaluation across dataset sizes
fn bench_filter_evaluation(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let plan = bench_plan();
    let mut group = c.benchmark_group("filter_evaluation");

    for rows in [600, 10_000, 100_000] {
        let (dataset, _) = load(&dir, rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &dataset, |b, dataset| {
            b.iter(|| black_box(evaluate(dataset, plan.proposed()).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark: endpoint statistics for an already split dataset
fn bench_endpoint_stats(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let plan = bench_plan();
    let (dataset, _) = load(&dir, 10_000);
    let split = split_cohorts(&plan, &dataset).unwrap();

    c.bench_function("endpoint_stats_10k", |b| {
        b.iter(|| {
            black_box(
                stats::compute(&plan.endpoint, &dataset, &split.baseline, &split.proposed)
                    .unwrap(),
            )
        });
    });
}

/// Benchmark: full execute, including fairness and the results write
fn bench_execute(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let (dataset, dict) = load(&dir, 10_000);
    let run_dir = dir.path().join("run");

    c.bench_function("execute_10k", |b| {
        b.iter(|| {
            let mut plan = bench_plan();
            black_box(execute(&mut plan, &dataset, Some(&dict), &run_dir, 10).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_filter_evaluation,
    bench_endpoint_stats,
    bench_execute,
);
criterion_main!(benches);

//! End-to-end runs over the synthetic cohort dataset
//!
//! Each test gets its own temp root with a generated `data/` directory so the
//! run cache and run directories never leak between tests.

use evidentia::executor::ResultsBundle;
use evidentia::provenance::Manifest;
use evidentia::settings::Settings;
use evidentia::stats::{EndpointStats, PowerEstimate};
use evidentia::{synth, EvidenceError, PlanInput, RunRequest, Runner};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn setup() -> (TempDir, Runner) {
    let dir = TempDir::new().unwrap();
    let settings = Settings::with_root(dir.path());
    synth::generate(&settings.data_path(), synth::DEFAULT_ROWS, 0).unwrap();
    (dir, Runner::new(settings))
}

fn demo_plan(endpoint: Value) -> Value {
    json!({
        "question": "What changes if the score cutoff drops from 26 to 24?",
        "dataset": {"uri": "local://data/data.csv", "dict": "local://data/data_dict.yaml"},
        "cohorts": {
            "baseline": {"and": [{"col": "score", "op": ">=", "val": 26}]},
            "proposed": {"and": [{"col": "score", "op": ">=", "val": 24}]}
        },
        "endpoint": endpoint,
        "analysis": {
            "stats": ["mean_diff"],
            "power": {"method": "normal_approx", "alpha": 0.05, "n_per_arm": 150, "target": 0.8}
        },
        "fairness": {"subgroups": ["sex", "age_band"]},
        "policy": {"autotune": {"enable": true, "steps": []}},
        "privacy": {"small_cell_k": 2},
        "seed": 0
    })
}

fn continuous() -> Value {
    json!({"type": "continuous", "value": "endpoint_value"})
}

fn request(plan: Value, token: Option<&str>) -> RunRequest {
    RunRequest {
        plan: PlanInput::Json(plan),
        idempotency_key: token.map(str::to_string),
    }
}

#[test]
fn test_run_end_to_end() {
    let (_dir, runner) = setup();
    let response = runner.run(request(demo_plan(continuous()), Some("abc"))).unwrap();

    let run_dir = response.results_path.parent().unwrap().to_path_buf();
    let results = ResultsBundle::read(&run_dir).unwrap();

    // Relaxing the cutoff can only add rows
    assert!(results.n_proposed >= results.n_baseline);
    assert!(results.n_baseline > 0);

    let power = results.power.value().unwrap();
    assert!(power > 0.0 && power < 1.0);
    assert!(matches!(results.stats, EndpointStats::Continuous(_)));

    let sex = &results.fairness["sex"];
    assert!(!sex.is_empty());
    for record in sex {
        match record.proposed {
            Some(n) => assert!(n >= 2),
            None => assert!(record.pct.is_none()),
        }
    }
    assert!(results.fairness.contains_key("age_band"));

    let manifest = Manifest::read(&run_dir).unwrap();
    assert!(manifest.verify());
    assert_eq!(manifest.body.seed, 0);

    let card = fs::read_to_string(&response.card_path).unwrap();
    assert!(card.contains("score cutoff drops"));
    assert!(response.final_plan_yaml.contains("n_per_arm"));
}

#[test]
fn test_idempotency_key_replays_run() {
    let (_dir, runner) = setup();
    let first = runner.run(request(demo_plan(continuous()), Some("abc"))).unwrap();
    let second = runner.run(request(demo_plan(continuous()), Some("abc"))).unwrap();

    assert_eq!(first.run_id, second.run_id);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.notes, vec!["cached".to_string()]);

    // Replay re-hashes the same final plan
    let run_dir = second.results_path.parent().unwrap();
    let manifest = Manifest::read(run_dir).unwrap();
    let plan = evidentia::AnalysisPlan::from_yaml_str(&second.final_plan_yaml).unwrap();
    assert_eq!(
        manifest.body.plan_hash,
        evidentia::provenance::sha256_text(&plan.to_json_string().unwrap())
    );
}

#[test]
fn test_changed_inputs_are_new_runs() {
    let (_dir, runner) = setup();
    let base = runner.run(request(demo_plan(continuous()), Some("abc"))).unwrap();

    let other_token = runner.run(request(demo_plan(continuous()), Some("xyz"))).unwrap();
    assert_ne!(base.run_id, other_token.run_id);

    let mut changed = demo_plan(continuous());
    changed["seed"] = json!(1);
    let other_plan = runner.run(request(changed, Some("abc"))).unwrap();
    assert_ne!(base.run_id, other_plan.run_id);
}

#[test]
fn test_deleted_results_fail_replay() {
    let (_dir, runner) = setup();
    let first = runner.run(request(demo_plan(continuous()), Some("abc"))).unwrap();
    fs::remove_file(&first.results_path).unwrap();

    match runner.run(request(demo_plan(continuous()), Some("abc"))) {
        Err(EvidenceError::CacheConsistency { run_id }) => assert_eq!(run_id, first.run_id),
        other => panic!("expected cache consistency error, got {other:?}"),
    }
}

#[test]
fn test_binary_endpoint_run() {
    let (_dir, runner) = setup();
    let plan = demo_plan(json!({"type": "binary", "value": "event_flag"}));
    let response = runner.run(request(plan, None)).unwrap();
    let results = ResultsBundle::read(response.results_path.parent().unwrap()).unwrap();

    match results.stats {
        EndpointStats::Binary(s) => {
            assert!((0.0..=1.0).contains(&s.p1));
            assert!((0.0..=1.0).contains(&s.p2));
            assert!(s.ci[0] <= s.delta && s.delta <= s.ci[1]);
        }
        other => panic!("expected binary stats, got {other:?}"),
    }
    assert!(results.power.is_computed());
}

#[test]
fn test_time_to_event_power_not_implemented() {
    let (_dir, runner) = setup();
    let plan = demo_plan(json!({
        "type": "time_to_event",
        "value": {"time": "event_time", "event": "event_flag"}
    }));
    let response = runner.run(request(plan, None)).unwrap();
    let results = ResultsBundle::read(response.results_path.parent().unwrap()).unwrap();

    assert!(matches!(results.stats, EndpointStats::TimeToEvent(_)));
    assert!(matches!(results.power, PowerEstimate::NotImplemented { .. }));
    assert!(response.notes.iter().any(|n| n.starts_with("power not computed")));
    assert!(response.notes.iter().any(|n| n.starts_with("autotune skipped")));
    // No silent resize without a computed power
    assert!(response.final_plan_yaml.contains("n_per_arm: 150"));
}

#[test]
fn test_unknown_column_is_configuration_error() {
    let (dir, runner) = setup();
    let mut plan = demo_plan(continuous());
    plan["fairness"]["subgroups"] = json!(["region"]);

    let err = runner.run(request(plan, Some("abc"))).unwrap_err();
    let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["fairness.subgroups[0]"]);
    // Nothing cached for a failed run
    assert!(!dir.path().join("runs").join("cache.json").exists());
}

#[test]
fn test_uri_outside_data_dir_rejected() {
    let (_dir, runner) = setup();
    let mut plan = demo_plan(continuous());
    plan["dataset"]["uri"] = json!("local://data/../../etc/passwd");
    assert!(runner.run(request(plan, None)).is_err());

    let mut plan = demo_plan(continuous());
    plan["dataset"]["dict"] = json!("s3://bucket/data_dict.yaml");
    assert!(runner.run(request(plan, None)).is_err());
}

#[test]
fn test_relaxed_cutoff_scenario() {
    let (_dir, runner) = setup();
    let mut plan = demo_plan(continuous());
    plan["analysis"]["power"]["n_per_arm"] = json!(50);
    plan["policy"]["autotune"]["enable"] = json!(false);

    let response = runner.run(request(plan, None)).unwrap();
    let results = ResultsBundle::read(response.results_path.parent().unwrap()).unwrap();

    assert!(results.n_proposed >= results.n_baseline);
    // The looser cohort adds rows with score in [24, 26), whose endpoint
    // values sit below those of the stricter cohort
    match &results.stats {
        EndpointStats::Continuous(s) => {
            assert!(s.delta < 0.0, "delta = {}", s.delta);
            assert_eq!(s.delta, s.mean_proposed - s.mean_baseline);
        }
        other => panic!("expected continuous stats, got {other:?}"),
    }
    let power = results.power.value().unwrap();
    assert!(power > 0.0 && power < 1.0);
    assert!(response.final_plan_yaml.contains("n_per_arm: 50"));
}

#[test]
fn test_concurrent_identical_requests_share_one_run() {
    let (_dir, runner) = setup();
    let barrier = std::sync::Barrier::new(8);

    let run_ids: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (runner, barrier) = (&runner, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    runner.run(request(demo_plan(continuous()), Some("abc")))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap().run_id)
            .collect()
    });

    assert!(run_ids.iter().all(|id| *id == run_ids[0]));
    let replay = runner.run(request(demo_plan(continuous()), Some("abc"))).unwrap();
    assert_eq!(replay.run_id, run_ids[0]);
    let run_dir = replay.results_path.parent().unwrap();
    assert!(Manifest::read(run_dir).unwrap().verify());
}

#[test]
fn test_absolute_data_path_in_dictionary_rejected() {
    let (dir, runner) = setup();
    let outside = TempDir::new().unwrap();
    let stray = outside.path().join("data.csv");
    fs::copy(dir.path().join("data/data.csv"), &stray).unwrap();

    let dict_path = dir.path().join("data/data_dict.yaml");
    let dict = fs::read_to_string(&dict_path).unwrap();
    fs::write(
        &dict_path,
        dict.replace("path: data.csv", &format!("path: {}", stray.display())),
    )
    .unwrap();

    let err = runner.run(request(demo_plan(continuous()), None)).unwrap_err();
    assert!(err.to_string().contains("absolute path"));
}

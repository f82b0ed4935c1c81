//! Request-level orchestration
//!
//! One call to [`Runner::run`] resolves the plan's dataset descriptor,
//! derives the cache key, and either replays a cached run or executes a
//! fresh one under the cache lock. Every run is finalized with a manifest
//! and an evidence card.

use crate::cache::{cache_key, modified_secs, RunCache};
use crate::dataset::{DataDict, Dataset};
use crate::error::{EvidenceError, Result};
use crate::executor::{execute, finalize, ResultsBundle, RESULTS_FILE};
use crate::plan::AnalysisPlan;
use crate::provenance::{now_secs, MANIFEST_FILE};
use crate::report::render_card;
use crate::settings::Settings;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, info_span, warn};
use uuid::Uuid;

pub const CACHED_NOTE: &str = "cached";

/// Plan as submitted by a caller
#[derive(Debug, Clone)]
pub enum PlanInput {
    Yaml(String),
    Json(Value),
}

impl PlanInput {
    fn parse(&self) -> Result<AnalysisPlan> {
        match self {
            PlanInput::Yaml(text) => AnalysisPlan::from_yaml_str(text),
            PlanInput::Json(value) => AnalysisPlan::from_json_value(value.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub plan: PlanInput,
    /// Caller token; identical tokens on identical inputs replay the same run
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    /// Plan as finally executed, including any autotune change
    pub final_plan_yaml: String,
    pub results_path: PathBuf,
    pub manifest_path: PathBuf,
    pub card_path: PathBuf,
    pub notes: Vec<String>,
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct Runner {
    settings: Settings,
    cache: RunCache,
}

impl Runner {
    pub fn new(settings: Settings) -> Self {
        let cache = RunCache::new(settings.cache_path());
        Self { settings, cache }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Directory of an existing run id
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        self.settings
            .resolve_output(&format!("{}{run_id}", self.settings.output_prefix))
    }

    pub fn run(&self, request: RunRequest) -> Result<RunResponse> {
        let start_time = now_secs();
        let mut plan = request.plan.parse()?;

        // The data URI is checked against the input boundary even though the
        // bytes are located through the descriptor.
        self.settings.resolve_input(&plan.dataset.uri)?;
        let dict_path = self.settings.resolve_input(&plan.dataset.dict)?;
        let dict = DataDict::from_file(&dict_path)?;
        let data_path = dict.data_path(&dict_path)?;

        let key = cache_key(
            &plan.to_json_string()?,
            modified_secs(&data_path)?,
            request.idempotency_key.as_deref(),
        );

        let mut guard = self.cache.lock()?;
        let (run_id, results, notes, cached) = match guard.lookup(&key).map(str::to_string) {
            Some(run_id) => {
                let span = info_span!("replay", run_id = %run_id);
                let _enter = span.enter();
                let run_dir = self.run_dir(&run_id)?;
                if !run_dir.join(RESULTS_FILE).is_file() {
                    warn!("cache names a run with no results");
                    return Err(EvidenceError::CacheConsistency { run_id });
                }
                let results = ResultsBundle::read(&run_dir)?;
                results.restore_plan(&mut plan);
                info!("cache hit");
                (run_id, results, vec![CACHED_NOTE.to_string()], true)
            }
            None => {
                let run_id = Uuid::new_v4().simple().to_string();
                let span = info_span!("run", run_id = %run_id);
                let _enter = span.enter();
                info!("cache miss; executing plan");
                let run_dir = self.run_dir(&run_id)?;
                let dataset = Dataset::from_csv_path(&data_path)?;
                let (results, notes) = execute(
                    &mut plan,
                    &dataset,
                    Some(&dict),
                    &run_dir,
                    self.settings.small_cell_default,
                )?;
                guard.store(&key, &run_id)?;
                (run_id, results, notes, false)
            }
        };
        drop(guard);

        let run_dir = self.run_dir(&run_id)?;
        finalize(&plan, &data_path, &run_dir, start_time)?;
        let final_plan_yaml = plan.to_yaml_string()?;
        let card_path = render_card(&final_plan_yaml, &results, &notes, &run_dir)?;
        info!(run_id = %run_id, cached, "run finalized");

        Ok(RunResponse {
            results_path: run_dir.join(RESULTS_FILE),
            manifest_path: run_dir.join(MANIFEST_FILE),
            run_id,
            final_plan_yaml,
            card_path,
            notes,
            cached,
        })
    }

    /// Re-render the evidence card of an existing run
    pub fn render(&self, run_id: &str, plan_yaml: &str) -> Result<PathBuf> {
        let run_dir = self.run_dir(run_id)?;
        let results = ResultsBundle::read(&run_dir)?;
        render_card(plan_yaml, &results, &[], &run_dir)
    }
}

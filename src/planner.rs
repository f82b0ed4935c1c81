//! Draft analysis plans from a question
//!
//! Starts from a default template, sets the question, and shallow-merges any
//! caller-supplied top-level sections over it. The draft must parse as a plan
//! before it is returned.

use crate::error::{EvidenceError, Result};
use crate::plan::AnalysisPlan;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Plan template used when drafting
pub fn default_plan() -> Value {
    json!({
        "question": "Impact of relaxing a threshold",
        "dataset": {"uri": "local://data/data.csv", "dict": "local://data/data_dict.yaml"},
        "cohorts": {
            "baseline": {"and": []},
            "proposed": {"and": []}
        },
        "endpoint": {"type": "continuous", "value": "endpoint_value"},
        "analysis": {
            "stats": ["mean_diff"],
            "power": {"method": "normal_approx", "alpha": 0.05, "n_per_arm": 150, "target": 0.8}
        },
        "fairness": {"subgroups": ["sex", "age_band"]},
        "policy": {"autotune": {"enable": true, "steps": []}},
        "privacy": {"small_cell_k": 10},
        "seed": 0
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftPlan {
    pub plan_yaml: String,
    pub plan_json: Value,
}

pub fn draft_plan(question: Option<&str>, defaults: Option<&Map<String, Value>>) -> Result<DraftPlan> {
    let mut plan = default_plan();
    let Some(sections) = plan.as_object_mut() else {
        return Err(EvidenceError::config("plan", "template is not an object"));
    };
    if let Some(question) = question.filter(|q| !q.trim().is_empty()) {
        sections.insert("question".to_string(), Value::String(question.to_string()));
    }
    if let Some(defaults) = defaults {
        for (key, value) in defaults {
            sections.insert(key.clone(), value.clone());
        }
    }

    AnalysisPlan::from_json_value(plan.clone())?;
    let plan_yaml = serde_yaml::to_string(&plan)
        .map_err(|e| EvidenceError::Data(format!("plan serialization failed: {e}")))?;
    Ok(DraftPlan {
        plan_yaml,
        plan_json: plan,
    })
}

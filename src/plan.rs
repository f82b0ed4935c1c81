//! Analysis plan documents
//!
//! A plan names two cohorts over one dataset, the endpoint to compare, the
//! power-analysis assumptions, and the subgroup/privacy policy. Plans arrive
//! as YAML or JSON:
//!
//! ```yaml
//! question: Impact of relaxing a threshold
//! dataset: {uri: "local://data/data.csv", dict: "local://data/data_dict.yaml"}
//! cohorts:
//!   baseline: {and: [{col: score, op: ">=", val: 26}]}
//!   proposed: {and: [{col: score, op: ">=", val: 24}]}
//! endpoint: {type: continuous, value: endpoint_value}
//! analysis:
//!   stats: [mean_diff]
//!   power: {method: normal_approx, alpha: 0.05, n_per_arm: 50, target: 0.8}
//! fairness: {subgroups: [sex]}
//! policy: {autotune: {enable: true}}
//! privacy: {small_cell_k: 10}
//! seed: 0
//! ```
//!
//! Parsing is structural first (serde), then an explicit validation pass
//! collects every field-level problem before reporting.

use crate::autotune::DEFAULT_GROWTH_FACTOR;
use crate::dataset::{ColumnKind, Dataset};
use crate::error::{EvidenceError, FieldError, Result};
use crate::filter::FilterNode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub const BASELINE: &str = "baseline";
pub const PROPOSED: &str = "proposed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Continuous,
    Binary,
    TimeToEvent,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::Continuous => "continuous",
            EndpointKind::Binary => "binary",
            EndpointKind::TimeToEvent => "time_to_event",
        }
    }
}

/// Outcome variable(s) compared between cohorts
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Continuous { column: String },
    Binary { column: String },
    TimeToEvent { time: String, event: String },
}

impl Endpoint {
    pub fn kind(&self) -> EndpointKind {
        match self {
            Endpoint::Continuous { .. } => EndpointKind::Continuous,
            Endpoint::Binary { .. } => EndpointKind::Binary,
            Endpoint::TimeToEvent { .. } => EndpointKind::TimeToEvent,
        }
    }

    fn to_doc(&self) -> EndpointDoc {
        let value = match self {
            Endpoint::Continuous { column } | Endpoint::Binary { column } => {
                EndpointValue::Column(column.clone())
            }
            Endpoint::TimeToEvent { time, event } => EndpointValue::Pair {
                time: time.clone(),
                event: event.clone(),
            },
        };
        EndpointDoc {
            kind: self.kind(),
            value,
        }
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_doc().serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EndpointDoc {
    #[serde(rename = "type")]
    kind: EndpointKind,
    value: EndpointValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum EndpointValue {
    Column(String),
    Pair { time: String, event: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    pub uri: String,
    pub dict: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSpec {
    pub method: String,
    pub alpha: f64,
    pub n_per_arm: u32,
    pub target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_assumed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p1_assumed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2_assumed: Option<f64>,
    /// Carried for provenance; time-to-event power is not computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_hr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    pub stats: Vec<String>,
    pub power: PowerSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FairnessSpec {
    #[serde(default)]
    pub subgroups: Vec<String>,
}

fn one() -> u32 {
    1
}

/// One autotune adjustment; only `n_per_arm *= factor` is supported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotuneStep {
    pub param: String,
    pub op: String,
    pub factor: f64,
    #[serde(default = "one")]
    pub max_times: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutotuneSpec {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub steps: Vec<AutotuneStep>,
}

impl AutotuneSpec {
    /// Multiplier applied to `n_per_arm` on retune
    pub fn growth_factor(&self) -> f64 {
        self.steps
            .first()
            .map(|step| step.factor)
            .unwrap_or(DEFAULT_GROWTH_FACTOR)
    }

    fn validate(&self, errors: &mut Vec<FieldError>) {
        if self.steps.len() > 1 {
            errors.push(FieldError::new(
                "policy.autotune.steps",
                "autotune runs at most once; give at most one step",
            ));
        }
        for (i, step) in self.steps.iter().enumerate() {
            let path = format!("policy.autotune.steps[{i}]");
            if step.param != "n_per_arm" {
                errors.push(FieldError::new(
                    format!("{path}.param"),
                    format!("unsupported autotune parameter {:?}", step.param),
                ));
            }
            if step.op != "multiply" {
                errors.push(FieldError::new(
                    format!("{path}.op"),
                    format!("unsupported autotune op {:?}", step.op),
                ));
            }
            if !(step.factor.is_finite() && step.factor > 1.0) {
                errors.push(FieldError::new(
                    format!("{path}.factor"),
                    "growth factor must be a finite number > 1",
                ));
            }
            if step.max_times > 1 {
                errors.push(FieldError::new(
                    format!("{path}.max_times"),
                    "autotune runs at most once per execution",
                ));
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    #[serde(default)]
    pub autotune: AutotuneSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivacySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_cell_k: Option<u32>,
}

/// Wire shape; cohorts and endpoint are typed by the validation pass
#[derive(Debug, Deserialize)]
struct PlanDoc {
    question: String,
    dataset: DataSpec,
    cohorts: IndexMap<String, Value>,
    endpoint: EndpointDoc,
    analysis: AnalysisSpec,
    #[serde(default)]
    fairness: FairnessSpec,
    #[serde(default)]
    policy: PolicySpec,
    #[serde(default)]
    privacy: PrivacySpec,
    #[serde(default)]
    seed: u64,
}

/// Validated analysis plan
///
/// Immutable apart from `analysis.power.n_per_arm`, which the autotune loop
/// may raise once per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisPlan {
    pub question: String,
    pub dataset: DataSpec,
    pub cohorts: IndexMap<String, FilterNode>,
    pub endpoint: Endpoint,
    pub analysis: AnalysisSpec,
    pub fairness: FairnessSpec,
    pub policy: PolicySpec,
    pub privacy: PrivacySpec,
    pub seed: u64,
}

impl AnalysisPlan {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| EvidenceError::config("plan", e.to_string()))?;
        Self::from_json_value(value)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EvidenceError::config("plan", e.to_string()))?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        let doc: PlanDoc =
            serde_json::from_value(value).map_err(|e| EvidenceError::config("plan", e.to_string()))?;

        let mut errors = Vec::new();

        let mut cohorts = IndexMap::new();
        for (name, raw) in &doc.cohorts {
            match FilterNode::from_json(raw, &format!("cohorts.{name}")) {
                Ok(node) => {
                    cohorts.insert(name.clone(), node);
                }
                Err(err) => errors.extend(err.field_errors().iter().cloned()),
            }
        }
        for required in [BASELINE, PROPOSED] {
            if !doc.cohorts.contains_key(required) {
                errors.push(FieldError::new(
                    format!("cohorts.{required}"),
                    "cohort is required",
                ));
            }
        }

        let endpoint = match (doc.endpoint.kind, doc.endpoint.value) {
            (EndpointKind::Continuous, EndpointValue::Column(column)) => {
                Some(Endpoint::Continuous { column })
            }
            (EndpointKind::Binary, EndpointValue::Column(column)) => Some(Endpoint::Binary { column }),
            (EndpointKind::TimeToEvent, EndpointValue::Pair { time, event }) => {
                Some(Endpoint::TimeToEvent { time, event })
            }
            (EndpointKind::TimeToEvent, EndpointValue::Column(_)) => {
                errors.push(FieldError::new(
                    "endpoint.value",
                    "time_to_event endpoints need a {time, event} column pair",
                ));
                None
            }
            (kind, EndpointValue::Pair { .. }) => {
                errors.push(FieldError::new(
                    "endpoint.value",
                    format!("{} endpoints name a single column", kind.as_str()),
                ));
                None
            }
        };

        validate_power(&doc.analysis.power, &mut errors);
        doc.policy.autotune.validate(&mut errors);

        for (i, column) in doc.fairness.subgroups.iter().enumerate() {
            if column.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("fairness.subgroups[{i}]"),
                    "column name must not be empty",
                ));
            }
        }
        if doc.privacy.small_cell_k == Some(0) {
            errors.push(FieldError::new("privacy.small_cell_k", "must be >= 1"));
        }

        match endpoint {
            Some(endpoint) if errors.is_empty() => Ok(AnalysisPlan {
                question: doc.question,
                dataset: doc.dataset,
                cohorts,
                endpoint,
                analysis: doc.analysis,
                fairness: doc.fairness,
                policy: doc.policy,
                privacy: doc.privacy,
                seed: doc.seed,
            }),
            _ => Err(EvidenceError::Configuration(errors)),
        }
    }

    /// Check every column the plan references against a loaded dataset
    pub fn validate_against(&self, dataset: &Dataset) -> Result<()> {
        let mut errors = Vec::new();

        for (name, node) in &self.cohorts {
            node.validate(dataset, &format!("cohorts.{name}"), &mut errors);
        }

        let numeric_like = [ColumnKind::Numeric, ColumnKind::Flag];
        let mut require = |field: &str, column: &str, kinds: &[ColumnKind]| match dataset
            .column(column)
        {
            None => errors.push(FieldError::new(field, format!("unknown column {column}"))),
            Some(data) if !kinds.contains(&data.kind()) => errors.push(FieldError::new(
                field,
                format!("column {column} is {:?}, expected one of {kinds:?}", data.kind()),
            )),
            Some(_) => {}
        };
        match &self.endpoint {
            Endpoint::Continuous { column } | Endpoint::Binary { column } => {
                require("endpoint.value", column, &numeric_like)
            }
            Endpoint::TimeToEvent { time, event } => {
                require("endpoint.value.time", time, &[ColumnKind::Numeric]);
                require("endpoint.value.event", event, &numeric_like);
            }
        }

        for (i, column) in self.fairness.subgroups.iter().enumerate() {
            if !dataset.has_column(column) {
                errors.push(FieldError::new(
                    format!("fairness.subgroups[{i}]"),
                    format!("unknown column {column}"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EvidenceError::Configuration(errors))
        }
    }

    pub fn baseline(&self) -> &FilterNode {
        &self.cohorts[BASELINE]
    }

    pub fn proposed(&self) -> &FilterNode {
        &self.cohorts[PROPOSED]
    }

    pub fn small_cell_k(&self, default: u32) -> u32 {
        self.privacy.small_cell_k.unwrap_or(default)
    }

    /// Canonical serialized plan text, used for cache keys and hashing
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| EvidenceError::Data(format!("plan serialization failed: {e}")))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| EvidenceError::Data(format!("plan serialization failed: {e}")))
    }
}

fn validate_power(power: &PowerSpec, errors: &mut Vec<FieldError>) {
    if !(power.alpha > 0.0 && power.alpha < 1.0) {
        errors.push(FieldError::new(
            "analysis.power.alpha",
            format!("must be in (0, 1), got {}", power.alpha),
        ));
    }
    if power.n_per_arm == 0 {
        errors.push(FieldError::new("analysis.power.n_per_arm", "must be >= 1"));
    }
    if !(0.0..=1.0).contains(&power.target) {
        errors.push(FieldError::new(
            "analysis.power.target",
            format!("must be in [0, 1], got {}", power.target),
        ));
    }
    if let Some(effect) = power.effect_assumed {
        if !effect.is_finite() {
            errors.push(FieldError::new(
                "analysis.power.effect_assumed",
                "must be finite",
            ));
        }
    }
    for (field, p) in [
        ("analysis.power.p1_assumed", power.p1_assumed),
        ("analysis.power.p2_assumed", power.p2_assumed),
    ] {
        if let Some(p) = p {
            if !(0.0..=1.0).contains(&p) {
                errors.push(FieldError::new(field, format!("must be in [0, 1], got {p}")));
            }
        }
    }
}

//! Deterministic synthetic cohort dataset
//!
//! Writes `data.csv` and a matching `data_dict.yaml` into a directory. The
//! same seed always yields byte-identical files.

use crate::dataset::{ColumnRole, ColumnSpec, DataDict, DataFile};
use crate::error::{display_name, EvidenceError, Result};
use crate::plan::EndpointKind;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Bernoulli, Distribution, Exp, Normal};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_ROWS: usize = 600;
pub const DATA_FILE: &str = "data.csv";
pub const DICT_FILE: &str = "data_dict.yaml";

const SEXES: [&str; 2] = ["F", "M"];
const AGE_BANDS: [&str; 3] = ["<65", "65-74", "75+"];

#[derive(Debug, Serialize)]
struct Row {
    id: usize,
    age: u32,
    score: f64,
    sex: &'static str,
    age_band: &'static str,
    endpoint_value: f64,
    event_time: f64,
    event_flag: u8,
}

/// Right-closed bands: (0, 65], (65, 75], (75, ∞)
fn age_band(age: u32) -> &'static str {
    match age {
        0..=65 => AGE_BANDS[0],
        66..=75 => AGE_BANDS[1],
        _ => AGE_BANDS[2],
    }
}

fn distribution_error(e: impl std::fmt::Display) -> EvidenceError {
    EvidenceError::Data(format!("invalid synthetic distribution: {e}"))
}

fn rows(n: usize, seed: u64) -> Result<Vec<Row>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let score_dist = Normal::new(25.0, 5.0).map_err(distribution_error)?;
    let noise = Normal::new(0.0, 1.0).map_err(distribution_error)?;
    let event_dist = Bernoulli::new(0.25).map_err(distribution_error)?;
    let time_dist = Exp::new(1.0 / 12.0).map_err(distribution_error)?;

    let mut out = Vec::with_capacity(n);
    for id in 0..n {
        let age = rng.gen_range(50..85);
        let score = score_dist.sample(&mut rng);
        let sex = SEXES.choose(&mut rng).copied().unwrap_or(SEXES[0]);
        let endpoint_value = noise.sample(&mut rng) + (score - 25.0) * 0.1;
        let event_flag = u8::from(event_dist.sample(&mut rng));
        let event_time = time_dist.sample(&mut rng);
        out.push(Row {
            id,
            age,
            score,
            sex,
            age_band: age_band(age),
            endpoint_value,
            event_time,
            event_flag,
        });
    }
    Ok(out)
}

/// Descriptor for the generated file
pub fn data_dict() -> DataDict {
    let spec = |role, endpoint_type, storage_type: Option<&str>, categories: Option<&[&str]>| {
        ColumnSpec {
            role,
            endpoint_type,
            storage_type: storage_type.map(str::to_string),
            categories: categories.map(|c| c.iter().map(|s| s.to_string()).collect()),
        }
    };
    let mut columns = IndexMap::new();
    columns.insert("id".to_string(), spec(ColumnRole::Id, None, None, None));
    columns.insert(
        "age".to_string(),
        spec(ColumnRole::CohortField, None, Some("int"), None),
    );
    columns.insert(
        "score".to_string(),
        spec(ColumnRole::CohortField, None, Some("float"), None),
    );
    columns.insert(
        "sex".to_string(),
        spec(ColumnRole::SubgroupField, None, None, Some(&SEXES[..])),
    );
    columns.insert(
        "age_band".to_string(),
        spec(ColumnRole::SubgroupField, None, None, Some(&AGE_BANDS[..])),
    );
    columns.insert(
        "endpoint_value".to_string(),
        spec(ColumnRole::Endpoint, Some(EndpointKind::Continuous), None, None),
    );
    columns.insert(
        "event_time".to_string(),
        spec(ColumnRole::Endpoint, Some(EndpointKind::TimeToEvent), None, None),
    );
    columns.insert(
        "event_flag".to_string(),
        spec(ColumnRole::EndpointFlag, None, None, None),
    );

    DataDict {
        dataset_id: "ds_demo".to_string(),
        files: vec![DataFile {
            path: DATA_FILE.to_string(),
        }],
        columns,
    }
}

/// Generate `rows` synthetic rows into `data_dir`; returns the descriptor path
pub fn generate(data_dir: &Path, rows: usize, seed: u64) -> Result<PathBuf> {
    fs::create_dir_all(data_dir)
        .map_err(|e| EvidenceError::storage("failed to create data directory", e))?;

    let data_path = data_dir.join(DATA_FILE);
    let mut writer = csv::Writer::from_path(&data_path).map_err(|e| {
        EvidenceError::storage(format!("failed to create {}", display_name(&data_path)), e)
    })?;
    for row in self::rows(rows, seed)? {
        writer
            .serialize(row)
            .map_err(|e| EvidenceError::storage(format!("failed to write {DATA_FILE}"), e))?;
    }
    writer
        .flush()
        .map_err(|e| EvidenceError::storage(format!("failed to write {DATA_FILE}"), e))?;

    let dict_path = data_dir.join(DICT_FILE);
    let yaml = serde_yaml::to_string(&data_dict())
        .map_err(|e| EvidenceError::storage("failed to encode data dictionary", e))?;
    fs::write(&dict_path, yaml)
        .map_err(|e| EvidenceError::storage(format!("failed to write {DICT_FILE}"), e))?;

    info!(rows, seed, "synthetic dataset written");
    Ok(dict_path)
}

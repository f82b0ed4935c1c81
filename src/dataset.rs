//! In-memory tabular dataset and its data dictionary
//!
//! Datasets are read once per run from CSV. Each column's kind is inferred
//! from its non-missing cells: all numeric → `Numeric`, all `true`/`false` →
//! `Flag`, otherwise `Categorical`. Empty cells and `NA`/`NaN`/`null` are
//! missing values and are kept as `None`, never imputed.

use crate::error::{display_name, EvidenceError, Result};
use crate::plan::EndpointKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Inferred kind of a dataset column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Flag,
}

/// Column cells, one entry per row
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
    Flag(Vec<Option<bool>>),
}

impl ColumnData {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
            ColumnData::Flag(_) => ColumnKind::Flag,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
            ColumnData::Flag(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell rendered as a category label; `None` when missing
    pub fn label(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map(format_number),
            ColumnData::Categorical(v) => v.get(row).cloned().flatten(),
            ColumnData::Flag(v) => v.get(row).copied().flatten().map(|b| b.to_string()),
        }
    }

    /// Cell as a number; flags map to 0/1, categories never convert
    pub fn number(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Numeric(v) => v.get(row).copied().flatten(),
            ColumnData::Flag(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|b| if b { 1.0 } else { 0.0 }),
            ColumnData::Categorical(_) => None,
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty()
        || cell.eq_ignore_ascii_case("na")
        || cell.eq_ignore_ascii_case("nan")
        || cell.eq_ignore_ascii_case("null")
}

fn parse_flag(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn infer_column(cells: Vec<String>) -> ColumnData {
    let present = || cells.iter().filter(|c| !is_missing(c));

    if present().all(|c| c.trim().parse::<f64>().is_ok()) {
        return ColumnData::Numeric(
            cells
                .iter()
                .map(|c| {
                    if is_missing(c) {
                        None
                    } else {
                        c.trim().parse().ok()
                    }
                })
                .collect(),
        );
    }

    if present().all(|c| parse_flag(c).is_some()) {
        return ColumnData::Flag(cells.iter().map(|c| parse_flag(c)).collect());
    }

    ColumnData::Categorical(
        cells
            .into_iter()
            .map(|c| if is_missing(&c) { None } else { Some(c) })
            .collect(),
    )
}

/// Immutable rows × named columns table
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: IndexMap<String, ColumnData>,
    rows: usize,
}

impl Dataset {
    /// Build a dataset from already-typed columns of equal length
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ColumnData)>,
        S: Into<String>,
    {
        let mut map = IndexMap::new();
        let mut rows = None;
        for (name, data) in columns {
            let name = name.into();
            match rows {
                None => rows = Some(data.len()),
                Some(n) if n != data.len() => {
                    return Err(EvidenceError::Data(format!(
                        "column {name} has {} rows, expected {n}",
                        data.len()
                    )));
                }
                Some(_) => {}
            }
            map.insert(name, data);
        }
        Ok(Self {
            columns: map,
            rows: rows.unwrap_or(0),
        })
    }

    /// Parse a headed CSV document
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| EvidenceError::storage("failed to read dataset header", e))?
            .iter()
            .map(String::from)
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                EvidenceError::storage(format!("failed to read dataset row {}", line + 1), e)
            })?;
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(record.get(i).unwrap_or_default().to_string());
            }
        }

        Self::from_columns(
            headers
                .into_iter()
                .zip(cells)
                .map(|(name, column)| (name, infer_column(column))),
        )
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| {
            EvidenceError::storage(format!("failed to open dataset {}", display_name(path)), e)
        })?;
        Self::from_csv_reader(file)
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
}

/// Role a column plays for plan consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Id,
    CohortField,
    SubgroupField,
    Endpoint,
    EndpointFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub role: ColumnRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<EndpointKind>,
    /// Declared storage type (informational)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<String>,
    /// Declared category order for subgroup tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub path: String,
}

/// Dataset descriptor (`data_dict.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDict {
    pub dataset_id: String,
    pub files: Vec<DataFile>,
    pub columns: IndexMap<String, ColumnSpec>,
}

impl DataDict {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let dict: DataDict = serde_yaml::from_str(content)
            .map_err(|e| EvidenceError::config("data_dict", e.to_string()))?;
        if dict.files.is_empty() {
            return Err(EvidenceError::config(
                "data_dict.files",
                "at least one data file is required",
            ));
        }
        Ok(dict)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EvidenceError::storage(format!("failed to read {}", display_name(path)), e)
        })?;
        Self::from_yaml_str(&content)
    }

    /// Path of the primary data file, relative to the descriptor's directory;
    /// absolute paths and `..` segments are rejected
    pub fn data_path(&self, dict_path: &Path) -> Result<PathBuf> {
        let file = self.files.first().ok_or_else(|| {
            EvidenceError::config("data_dict.files", "at least one data file is required")
        })?;
        let path = Path::new(&file.path);
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(EvidenceError::config(
                        "data_dict.files[0].path",
                        "path traversal",
                    ));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(EvidenceError::config(
                        "data_dict.files[0].path",
                        "absolute path",
                    ));
                }
            }
        }
        let base = dict_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(base.join(path))
    }

    /// Declared category order for a subgroup column, if any
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.columns
            .get(column)
            .and_then(|spec| spec.categories.as_deref())
    }
}

//! Filesystem layout, policy defaults, and input/output URI resolution
//!
//! Settings load from an optional `evidentia.toml`:
//!
//! ```toml
//! root = "/srv/evidentia"
//! data_dir = "data"
//! runs_dir = "runs"
//! small_cell_default = 10
//! ```
//!
//! Plans reference datasets by URI (`local://data/data_dict.yaml`). Only URIs
//! under the configured prefixes resolve, and a relative remainder containing a
//! `..` segment is always rejected.

use crate::error::{display_name, EvidenceError, FieldError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Default config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "evidentia.toml";

/// Default small-cell suppression threshold
pub const SMALL_CELL_DEFAULT: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Base directory that `data_dir` and `runs_dir` are relative to
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub runs_dir: PathBuf,
    /// Cache map file name, stored inside `runs_dir`
    pub cache_file: String,
    /// Only input URIs with this prefix are resolved
    pub input_prefix: String,
    /// Only output URIs with this prefix are resolved
    pub output_prefix: String,
    /// Small-cell threshold used when a plan does not set `privacy.small_cell_k`
    pub small_cell_default: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_dir: PathBuf::from("data"),
            runs_dir: PathBuf::from("runs"),
            cache_file: "cache.json".to_string(),
            input_prefix: "local://data/".to_string(),
            output_prefix: "local://runs/".to_string(),
            small_cell_default: SMALL_CELL_DEFAULT,
        }
    }
}

impl Settings {
    /// Settings rooted at `root` with every other value defaulted
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EvidenceError::storage(format!("failed to read {}", display_name(path)), e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| EvidenceError::config("settings", e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` if given, else `evidentia.toml` if present, else defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.small_cell_default == 0 {
            errors.push(FieldError::new("small_cell_default", "must be >= 1"));
        }
        if self.cache_file.is_empty() || self.cache_file.contains(|c: char| c == '/' || c == '\\') {
            errors.push(FieldError::new(
                "cache_file",
                "must be a plain file name inside runs_dir",
            ));
        }
        for (field, prefix) in [
            ("input_prefix", &self.input_prefix),
            ("output_prefix", &self.output_prefix),
        ] {
            if !prefix.ends_with('/') {
                errors.push(FieldError::new(field, "must end with '/'"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EvidenceError::Configuration(errors))
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(&self.data_dir)
    }

    pub fn runs_path(&self) -> PathBuf {
        self.root.join(&self.runs_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.runs_path().join(&self.cache_file)
    }

    /// Resolve a `local://data/...` URI to a path under the data directory
    pub fn resolve_input(&self, uri: &str) -> Result<PathBuf> {
        ensure_local(uri, &self.input_prefix, &self.data_path())
    }

    /// Resolve a `local://runs/...` URI to a path under the runs directory
    pub fn resolve_output(&self, uri: &str) -> Result<PathBuf> {
        ensure_local(uri, &self.output_prefix, &self.runs_path())
    }
}

fn ensure_local(uri: &str, prefix: &str, base: &Path) -> Result<PathBuf> {
    let Some(rel) = uri.strip_prefix(prefix) else {
        return Err(EvidenceError::config(
            "uri",
            format!("invalid uri {uri:?}: expected prefix {prefix:?}"),
        ));
    };

    let rel = Path::new(rel);
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(EvidenceError::config(
                    "uri",
                    format!("invalid uri {uri:?}: path traversal"),
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(EvidenceError::config(
                    "uri",
                    format!("invalid uri {uri:?}: absolute path"),
                ));
            }
        }
    }

    Ok(base.join(rel))
}

//! Provenance manifests
//!
//! Every run, fresh or replayed, gets a `manifest.json` naming the exact plan
//! and dataset bytes it was computed from (SHA-256), the seed, wall-clock
//! bounds, and the build environment. The manifest body is sealed with its
//! own SHA-256 digest.

use crate::cache::write_atomic;
use crate::error::{display_name, EvidenceError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";

const CRATE_MANIFEST: &str = include_str!("../Cargo.toml");

pub fn sha256_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Streamed SHA-256 of a file's bytes
pub fn sha256_file(path: &Path) -> Result<String> {
    let name = display_name(path);
    let mut file = File::open(path)
        .map_err(|e| EvidenceError::storage(format!("failed to open {name}"), e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| EvidenceError::storage(format!("failed to read {name}"), e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Seconds since the Unix epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Build environment the results were produced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub package: String,
    pub version: String,
    pub platform: String,
    /// `name version` for each declared dependency
    pub dependencies: Vec<String>,
}

impl Environment {
    pub fn current() -> Self {
        Self {
            package: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            dependencies: declared_dependencies(CRATE_MANIFEST),
        }
    }
}

fn declared_dependencies(manifest: &str) -> Vec<String> {
    let Ok(table) = manifest.parse::<toml::Table>() else {
        return Vec::new();
    };
    let Some(deps) = table.get("dependencies").and_then(|d| d.as_table()) else {
        return Vec::new();
    };
    deps.iter()
        .map(|(name, spec)| {
            let version = match spec {
                toml::Value::String(v) => Some(v.as_str()),
                toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()),
                _ => None,
            };
            match version {
                Some(v) => format!("{name} {v}"),
                None => name.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestBody {
    /// SHA-256 of the serialized final plan
    pub plan_hash: String,
    /// SHA-256 of the dataset file bytes
    pub dataset_hash: String,
    pub seed: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub environment: Environment,
}

impl ManifestBody {
    fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| EvidenceError::storage("failed to encode manifest", e))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Immutable record of a run's inputs and environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(flatten)]
    pub body: ManifestBody,
    /// SHA-256 over the body
    pub digest: String,
}

impl Manifest {
    pub fn seal(body: ManifestBody) -> Result<Self> {
        let digest = body.digest()?;
        Ok(Self { body, digest })
    }

    /// True when the body still matches its digest
    pub fn verify(&self) -> bool {
        self.body
            .digest()
            .map(|d| d == self.digest)
            .unwrap_or(false)
    }

    pub fn write(&self, run_dir: &Path) -> Result<PathBuf> {
        let path = run_dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| EvidenceError::storage("failed to encode manifest", e))?;
        write_atomic(&path, text.as_bytes())?;
        info!(digest = %self.digest, "manifest written");
        Ok(path)
    }

    pub fn read(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| EvidenceError::storage(format!("failed to read {MANIFEST_FILE}"), e))?;
        serde_json::from_str(&text)
            .map_err(|e| EvidenceError::storage(format!("corrupt {MANIFEST_FILE}"), e))
    }
}

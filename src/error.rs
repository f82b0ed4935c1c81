//! Error kinds for plan validation, statistics, and run storage
//!
//! Configuration problems are collected as field-level errors so a caller
//! sees every offending field of a plan at once, not just the first.

use std::fmt;
use thiserror::Error;

/// A single offending field in a plan, descriptor, or settings document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path to the field (e.g. `cohorts.proposed.and[0].col`)
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while validating, computing, or persisting a run
#[derive(Error, Debug)]
pub enum EvidenceError {
    /// Malformed plan, unknown operator, bad NOT arity, or missing column
    #[error("invalid configuration: {}", join_fields(.0))]
    Configuration(Vec<FieldError>),

    /// Cohort too small for a variance estimate, or undefined endpoint values
    #[error("data error: {0}")]
    Data(String),

    /// Dataset, cache, or results file could not be read or written
    #[error("storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The cache names a run whose results are no longer on disk
    #[error("cache consistency error: cached run {run_id} has no results file")]
    CacheConsistency { run_id: String },
}

impl EvidenceError {
    /// Shorthand for a configuration error on a single field
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        EvidenceError::Configuration(vec![FieldError::new(field, message)])
    }

    pub fn storage(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        EvidenceError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Field errors carried by a configuration error (empty for other kinds)
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            EvidenceError::Configuration(errors) => errors,
            _ => &[],
        }
    }
}

/// Result type for evidentia operations
pub type Result<T> = std::result::Result<T, EvidenceError>;

/// File name component of a path, for error messages that must not leak
/// the directory layout
pub(crate) fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<unnamed>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_configuration_error_lists_every_field() {
        let err = EvidenceError::Configuration(vec![
            FieldError::new("cohorts.baseline", "missing"),
            FieldError::new("analysis.power.alpha", "must be in (0, 1)"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("cohorts.baseline: missing"));
        assert!(msg.contains("analysis.power.alpha: must be in (0, 1)"));
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = EvidenceError::storage("failed to read data.csv", io);
        assert_eq!(err.to_string(), "storage error: failed to read data.csv");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.field_errors().is_empty());
    }

    #[test]
    fn test_cache_consistency_is_distinct() {
        let err = EvidenceError::CacheConsistency {
            run_id: "abc".to_string(),
        };
        assert!(matches!(err, EvidenceError::CacheConsistency { .. }));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_display_name_strips_directories() {
        assert_eq!(display_name(Path::new("/srv/secret/data.csv")), "data.csv");
        assert_eq!(display_name(Path::new("/")), "<unnamed>");
    }
}

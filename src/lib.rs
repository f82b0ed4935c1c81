//! Evidentia - reproducible two-cohort evidence runs
//!
//! An analysis plan names a dataset, two cohort filters, one endpoint and a
//! power target. Executing it yields endpoint statistics, a power estimate
//! (optionally raised once by autotune), small-cell-suppressed subgroup
//! tables, a provenance manifest and a Markdown evidence card. Identical
//! inputs plus the same idempotency token replay the cached run.

pub mod autotune;
pub mod cache;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod fairness;
pub mod filter;
pub mod plan;
pub mod planner;
pub mod provenance;
pub mod report;
pub mod runner;
pub mod settings;
pub mod stats;
pub mod synth;

pub use error::{EvidenceError, FieldError, Result};
pub use plan::AnalysisPlan;
pub use runner::{PlanInput, RunRequest, RunResponse, Runner};

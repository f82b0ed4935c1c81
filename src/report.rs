//! Markdown evidence card
//!
//! One page per run: the question, the final plan, cohort sizes, endpoint
//! statistics, power, autotune outcome, and the suppressed subgroup tables.

use crate::autotune::AutotuneRecord;
use crate::cache::write_atomic;
use crate::error::{EvidenceError, Result};
use crate::executor::ResultsBundle;
use crate::fairness::FairnessRecord;
use crate::stats::{EndpointStats, PowerEstimate};
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};

pub const CARD_FILE: &str = "evidence_card.md";

const SUPPRESSED: &str = "suppressed";

fn fmt_value(value: f64) -> String {
    format!("{value:.4}")
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt_value).unwrap_or_else(|| "not reached".to_string())
}

fn question_of(plan_yaml: &str) -> Option<String> {
    let doc: serde_yaml::Value = serde_yaml::from_str(plan_yaml).ok()?;
    doc.get("question")?.as_str().map(str::to_string)
}

fn write_stats(out: &mut String, stats: &EndpointStats) -> fmt::Result {
    writeln!(out, "| Statistic | Value |")?;
    writeln!(out, "|---|---|")?;
    match stats {
        EndpointStats::Continuous(s) => {
            writeln!(out, "| Endpoint | continuous |")?;
            writeln!(out, "| Mean (baseline) | {} |", fmt_value(s.mean_baseline))?;
            writeln!(out, "| Mean (proposed) | {} |", fmt_value(s.mean_proposed))?;
            writeln!(out, "| Pooled SD | {} |", fmt_value(s.sp))?;
            writeln!(out, "| Difference | {} |", fmt_value(s.delta))?;
            writeln!(
                out,
                "| 95% CI | [{}, {}] |",
                fmt_value(s.ci[0]),
                fmt_value(s.ci[1])
            )?;
        }
        EndpointStats::Binary(s) => {
            writeln!(out, "| Endpoint | binary |")?;
            writeln!(out, "| Proportion (baseline) | {} |", fmt_value(s.p1))?;
            writeln!(out, "| Proportion (proposed) | {} |", fmt_value(s.p2))?;
            writeln!(out, "| Difference | {} |", fmt_value(s.delta))?;
            writeln!(
                out,
                "| 95% CI | [{}, {}] |",
                fmt_value(s.ci[0]),
                fmt_value(s.ci[1])
            )?;
        }
        EndpointStats::TimeToEvent(s) => {
            writeln!(out, "| Endpoint | time to event |")?;
            writeln!(out, "| Median survival (baseline) | {} |", fmt_opt(s.median_baseline))?;
            writeln!(out, "| Median survival (proposed) | {} |", fmt_opt(s.median_proposed))?;
            writeln!(out, "| Events (baseline) | {} |", s.events_baseline)?;
            writeln!(out, "| Events (proposed) | {} |", s.events_proposed)?;
        }
    }
    Ok(())
}

fn write_fairness_row(out: &mut String, r: &FairnessRecord) -> fmt::Result {
    let proposed = r
        .proposed
        .map(|n| n.to_string())
        .unwrap_or_else(|| SUPPRESSED.to_string());
    let pct = r
        .pct
        .map(|p| format!("{p:.1}%"))
        .unwrap_or_else(|| SUPPRESSED.to_string());
    writeln!(
        out,
        "| {} | {} | {} | {:+} | {} |",
        r.category, r.baseline, proposed, r.delta, pct
    )
}

/// Render the card as Markdown text
pub fn render_markdown(
    plan_yaml: &str,
    results: &ResultsBundle,
    notes: &[String],
) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    write_card(&mut out, plan_yaml, results, notes)?;
    Ok(out)
}

fn write_card(
    out: &mut String,
    plan_yaml: &str,
    results: &ResultsBundle,
    notes: &[String],
) -> fmt::Result {
    writeln!(out, "# Evidence Card")?;
    writeln!(out)?;
    if let Some(question) = question_of(plan_yaml) {
        writeln!(out, "**Question:** {question}")?;
        writeln!(out)?;
    }

    writeln!(out, "## Cohorts")?;
    writeln!(out)?;
    writeln!(out, "| Cohort | N |")?;
    writeln!(out, "|---|---|")?;
    writeln!(out, "| baseline | {} |", results.n_baseline)?;
    writeln!(out, "| proposed | {} |", results.n_proposed)?;
    writeln!(out)?;

    writeln!(out, "## Endpoint")?;
    writeln!(out)?;
    write_stats(out, &results.stats)?;
    writeln!(out)?;

    writeln!(out, "## Power")?;
    writeln!(out)?;
    match &results.power {
        PowerEstimate::Computed { value } => writeln!(out, "Achieved power: **{}**", fmt_value(*value))?,
        PowerEstimate::NotImplemented { reason } => {
            writeln!(out, "Power: **not implemented** ({reason}).")?
        }
    }
    match &results.autotune {
        AutotuneRecord::Retuned { from, to } => {
            writeln!(out)?;
            writeln!(out, "Autotune raised n per arm from {from} to {to}.")?;
        }
        AutotuneRecord::Skipped { reason } => {
            writeln!(out)?;
            writeln!(out, "Autotune skipped: {reason}.")?;
        }
        AutotuneRecord::Evaluated => {}
    }
    writeln!(out)?;

    if !results.fairness.is_empty() {
        writeln!(out, "## Subgroups")?;
        writeln!(out)?;
        for (column, records) in &results.fairness {
            writeln!(out, "### {column}")?;
            writeln!(out)?;
            writeln!(out, "| Category | Baseline | Proposed | Delta | % of proposed |")?;
            writeln!(out, "|---|---|---|---|---|")?;
            for record in records {
                write_fairness_row(out, record)?;
            }
            writeln!(out)?;
        }
    }

    if !notes.is_empty() {
        writeln!(out, "## Notes")?;
        writeln!(out)?;
        for note in notes {
            writeln!(out, "- {note}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Plan")?;
    writeln!(out)?;
    writeln!(out, "```yaml")?;
    write!(out, "{}", plan_yaml.trim_end())?;
    writeln!(out)?;
    writeln!(out, "```")
}

/// Render and write `evidence_card.md` into `run_dir`
pub fn render_card(
    plan_yaml: &str,
    results: &ResultsBundle,
    notes: &[String],
    run_dir: &Path,
) -> Result<PathBuf> {
    let path = run_dir.join(CARD_FILE);
    let markdown = render_markdown(plan_yaml, results, notes)
        .map_err(|e| EvidenceError::storage(format!("failed to render {CARD_FILE}"), e))?;
    write_atomic(&path, markdown.as_bytes())?;
    Ok(path)
}

use anyhow::{Context, Result};
use clap::Parser;
use evidentia::cli::{Cli, Command, LogFormat};
use evidentia::runner::{PlanInput, RunRequest, Runner};
use evidentia::settings::Settings;
use evidentia::{planner, synth};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the stderr tracing subscriber
fn init_tracing(debug: bool, format: LogFormat) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::discover(cli.config.as_deref())?;
    if let Some(root) = &cli.root {
        settings.root = root.clone();
    }
    Ok(settings)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format);
    let settings = load_settings(&cli)?;

    match cli.command {
        Command::Run {
            plan,
            idempotency_key,
        } => {
            // YAML is a superset of JSON, so one parser covers both plan files
            let request = RunRequest {
                plan: PlanInput::Yaml(read_text(&plan)?),
                idempotency_key,
            };
            let response = Runner::new(settings).run(request)?;
            print_json(&response)?;
        }
        Command::Draft { question, defaults } => {
            let defaults: Option<Value> = match defaults {
                Some(path) => Some(
                    serde_yaml::from_str(&read_text(&path)?)
                        .with_context(|| format!("invalid defaults in {}", path.display()))?,
                ),
                None => None,
            };
            let sections = match &defaults {
                Some(Value::Object(map)) => Some(map),
                Some(_) => anyhow::bail!("defaults must be a mapping of plan sections"),
                None => None,
            };
            let draft = planner::draft_plan(question.as_deref(), sections)?;
            print_json(&draft)?;
        }
        Command::Synth { rows, seed, out } => {
            let data_dir = out.unwrap_or_else(|| settings.data_path());
            let dict_path = synth::generate(&data_dir, rows, seed)?;
            print_json(&serde_json::json!({
                "rows": rows,
                "seed": seed,
                "data_dict": dict_path,
            }))?;
        }
        Command::Render { run_id, plan } => {
            let card = Runner::new(settings).render(&run_id, &read_text(&plan)?)?;
            print_json(&serde_json::json!({ "run_id": run_id, "card_path": card }))?;
        }
    }

    Ok(())
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use aiflow::dsl::validation::validate_text;
use aiflow::llm::{OpenAiCompatibleModel, OpenAiConfig};
use aiflow::{parse_definition, DslFormat, EngineConfig, ExecutionEvent, WorkflowError, WorkflowRunner};

#[derive(Parser)]
#[command(name = "aiflow", version, about = "Run and validate workflow definitions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a definition and stream NDJSON progress events to stdout.
    Run {
        #[arg(long, short)]
        definition: PathBuf,
        /// Trigger payload as JSON; plain text is passed through as a string.
        #[arg(long, short)]
        input: Option<String>,
        /// Engine settings (TOML).
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print the validation report of a definition.
    Validate {
        #[arg(long, short)]
        definition: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run {
            definition,
            input,
            config,
        } => {
            let success = run(&definition, input.as_deref(), config.as_deref()).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Command::Validate { definition } => {
            let text = read(&definition)?;
            let report = validate_text(&text, DslFormat::from_path(&definition));
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn parse_input(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

async fn run(definition: &Path, input: Option<&str>, config: Option<&Path>) -> Result<bool> {
    let config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let definition = parse_definition(&read(definition)?, DslFormat::from_path(definition))?;

    let mut builder = WorkflowRunner::builder(definition)
        .input(parse_input(input))
        .config(config);
    match OpenAiConfig::from_env() {
        Some(model_config) => {
            info!(base_url = %model_config.base_url, model = %model_config.default_model, "language model configured");
            builder = builder.model(Arc::new(OpenAiCompatibleModel::new(model_config)?));
        }
        None => warn!("OPENAI_API_KEY not set; model-backed nodes will fail"),
    }

    let mut handle = match builder.run().await {
        Ok(handle) => handle,
        Err(err) => {
            let message = match &err {
                WorkflowError::ValidationFailed(report) => report
                    .errors()
                    .iter()
                    .map(|d| format!("{}: {}", d.code, d.message))
                    .collect::<Vec<_>>()
                    .join("; "),
                other => other.to_string(),
            };
            emit(&ExecutionEvent::Error { error: message })?;
            return Ok(false);
        }
    };

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let mut success = false;
    while let Some(event) = handle.next_event().await {
        if let ExecutionEvent::Final { result } = &event {
            success = result.success;
        }
        emit(&event)?;
    }
    let result = handle.wait().await;
    if let Some(error) = &result.error {
        info!(error = %error, "run did not succeed");
    }
    Ok(success)
}

fn emit(event: &ExecutionEvent) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", event.to_ndjson()).context("writing event")?;
    out.flush().context("flushing stdout")
}

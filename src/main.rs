use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use rowdag::engine::ExecutionResult;
use rowdag::store::DirRowStore;
use rowdag::{AppContext, EngineConfig, Pipeline};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// TOML engine configuration; ROWDAG_* variables override it
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline definition and print the result as JSON
    Run {
        /// Pipeline definition (.json, .yaml or .yml)
        #[clap(short, long)]
        pipeline: PathBuf,
        /// Directory holding <table>.json and <table>.csv files
        #[clap(short, long)]
        data: PathBuf,
        #[clap(long)]
        no_cache: bool,
        /// Execute this many times; later runs may be served from the cache
        #[clap(short, long, default_value = "1")]
        repeat: usize,
        /// Print single-line JSON
        #[clap(long)]
        compact: bool,
    },
    /// Print the structural hash of a pipeline definition
    Hash {
        #[clap(short, long)]
        pipeline: PathBuf,
    },
    /// Print the inferred columns of one node
    Columns {
        #[clap(short, long)]
        pipeline: PathBuf,
        #[clap(short, long)]
        data: PathBuf,
        #[clap(short, long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Run {
            pipeline,
            data,
            no_cache,
            repeat,
            compact,
        } => {
            let pipeline = load_pipeline(&pipeline)?;
            info!("Running pipeline: {} ({})", pipeline.name, pipeline.id);
            let context = context_for(config, &data);
            let pipeline_id = context.pipeline_service().save_pipeline(pipeline).await?.id;

            let mut last = None;
            for _ in 0..repeat.max(1) {
                let result = context
                    .pipeline_service()
                    .execute_pipeline(&pipeline_id, !no_cache)
                    .await?;
                print_status(&result);
                last = Some(result);
            }

            if let Some(result) = last {
                let output = if compact {
                    serde_json::to_string(&result)?
                } else {
                    serde_json::to_string_pretty(&result)?
                };
                println!("{}", output);
                if let Some(message) = result.error {
                    bail!(message);
                }
            }
        }
        Commands::Hash { pipeline } => {
            let pipeline = load_pipeline(&pipeline)?;
            println!("{}", pipeline.structural_hash());
        }
        Commands::Columns {
            pipeline,
            data,
            node,
        } => {
            let pipeline = load_pipeline(&pipeline)?;
            let context = context_for(config, &data);
            let pipeline_id = context.pipeline_service().save_pipeline(pipeline).await?.id;
            let columns = context
                .pipeline_service()
                .node_columns(&pipeline_id, &node)
                .await?;
            println!("{}", serde_json::to_string_pretty(&columns)?);
        }
    }

    Ok(())
}

fn context_for(config: EngineConfig, data: &Path) -> AppContext {
    AppContext::new(config, Arc::new(DirRowStore::new(data)))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let base = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let overrides = std::env::vars()
        .filter(|(key, _)| key.starts_with("ROWDAG_"))
        .collect();
    Ok(base.with_overrides(&overrides))
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let pipeline: Pipeline = if is_yaml {
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid YAML pipeline {}", path.display()))?
    } else {
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid JSON pipeline {}", path.display()))?
    };
    Ok(pipeline)
}

fn print_status(result: &ExecutionResult) {
    let source = if result.cached { " (cached)" } else { "" };
    match &result.error {
        None => eprintln!(
            "{} {} in {}ms{}, {} leaf result(s)",
            "✓".green().bold(),
            result.pipeline_id,
            result.execution_time,
            source,
            result.leaf_results.len()
        ),
        Some(message) => eprintln!("{} {}: {}", "✗".red().bold(), result.pipeline_id, message.red()),
    }
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_deref()
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_string()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

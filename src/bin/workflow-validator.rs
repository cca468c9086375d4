//! # Workflow Validator
//!
//! Command-line tool for validating workflow definition files before they are
//! handed to the orchestrator. Reports dependency graph problems, the resolved
//! execution order and the queue each built-in step is dispatched to.

use clap::{Parser, ValueEnum};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;
use tasker_pipeline::config::{ConfigManager, PipelineConfig};
use tasker_pipeline::orchestration::{DependencyGraph, WorkflowDefinition};
use tasker_pipeline::Result;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "workflow-validator")]
#[command(about = "Validate workflow definition files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Workflow definition files (YAML)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Environment whose overrides are applied (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Failed to load pipeline configuration: {e}");
            error!("Configuration loading failed: {}", e);
            process::exit(1);
        }
    };

    let mut all_valid = true;
    for path in &cli.files {
        let valid = match cli.format {
            OutputFormat::Text => validate_file_text(path, &cli, &config).await,
            OutputFormat::Json => validate_file_json(path, &cli).await,
        };
        all_valid &= valid;
    }

    if all_valid {
        info!("Workflow validation completed successfully");
        process::exit(0);
    }

    error!("Workflow validation failed");
    process::exit(1);
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?;
    Ok(manager.config().clone())
}

fn render_json(output: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(output)?)
}

async fn validate_file_text(path: &Path, cli: &Cli, config: &PipelineConfig) -> bool {
    println!("🔧 Validating Workflow: {}", path.display());
    println!("Environment: {}", cli.environment);

    let definition = match WorkflowDefinition::load_from_file(path, &cli.environment).await {
        Ok(definition) => {
            println!("✅ Workflow definition loaded ({} steps)", definition.steps.len());
            definition
        }
        Err(e) => {
            println!("❌ {e}");
            println!();
            return false;
        }
    };

    let report = definition.validate();
    if !report.valid {
        println!("❌ Workflow '{}' is invalid:", definition.id);
        for error in &report.errors {
            println!("   • {error}");
        }
        println!();
        return false;
    }

    println!("✅ Dependency graph is valid");

    if let Some(levels) = DependencyGraph::new(&definition.steps).execution_levels() {
        println!("📋 Execution order:");
        for (wave, step_ids) in levels.iter().enumerate() {
            println!("  {}. {}", wave + 1, step_ids.join(", "));
        }
    }

    if cli.verbose > 0 {
        println!("📦 Step routing:");
        for step in &definition.steps {
            match config.queue.queues.queue_for(&step.step_type) {
                Some(queue_name) => {
                    println!("  • {} ({}) → queue '{}'", step.id, step.step_type, queue_name)
                }
                None => println!(
                    "  • {} ({}) → custom handler required",
                    step.id, step.step_type
                ),
            }
        }
    }

    println!();
    true
}

async fn validate_file_json(path: &Path, cli: &Cli) -> bool {
    let output = match WorkflowDefinition::load_from_file(path, &cli.environment).await {
        Ok(definition) => {
            let report = definition.validate();
            let execution_order = if report.valid {
                DependencyGraph::new(&definition.steps).execution_order()
            } else {
                None
            };
            json!({
                "file": path.display().to_string(),
                "workflow_id": definition.id,
                "valid": report.valid,
                "errors": report.errors,
                "execution_order": execution_order,
            })
        }
        Err(e) => json!({
            "file": path.display().to_string(),
            "valid": false,
            "errors": [e.to_string()],
        }),
    };

    let valid = output["valid"].as_bool().unwrap_or(false);
    match render_json(&output) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => println!("{{\"error\": \"{e}\"}}"),
    }
    valid
}

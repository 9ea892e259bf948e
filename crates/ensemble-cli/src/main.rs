//! Ensemble CLI - multi-backend model orchestration

use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use ensemble_core::config::Config;
use ensemble_core::engine::{ExecutionContext, OrchestrationResult, Strategy};
use ensemble_core::orchestrator::Orchestrator;
use ensemble_core::provider::{DryRunAdapter, OpenRouterAdapter, ProviderAdapter};
use ensemble_core::registry::{Capability, ModelRegistry};
use ensemble_core::routing::{TaskSpec, TaskType};
use serde_json::{Value, json};
use tracing::info;

#[derive(Parser)]
#[command(name = "ensemble")]
#[command(author, version, about = "Multi-backend model orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered models
    Models {
        /// Only models with this capability
        #[arg(short, long)]
        capability: Option<String>,
    },

    /// List dispatch strategies
    Strategies,

    /// Show ranked candidates for a task without invoking anything
    Route {
        /// Task type (component-generation, code-review, ...)
        #[arg(short, long)]
        task_type: String,
        /// Required capability (repeatable; defaults to the task type's)
        #[arg(short, long)]
        capability: Vec<String>,
        /// Preferred model (repeatable)
        #[arg(short, long)]
        prefer: Vec<String>,
    },

    /// Orchestrate a task across the routed models
    Run {
        /// Task type (component-generation, code-review, ...)
        #[arg(short, long)]
        task_type: String,
        /// What to produce
        #[arg(short, long)]
        description: String,
        /// Required capability (repeatable; defaults to the task type's)
        #[arg(short, long)]
        capability: Vec<String>,
        /// Preferred model (repeatable)
        #[arg(short, long)]
        prefer: Vec<String>,
        /// Strategy (defaults to orchestration.default_strategy)
        #[arg(short, long)]
        strategy: Option<String>,
        /// Context entry as key=value; JSON values are parsed (repeatable)
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
        /// Use the offline adapter instead of calling a backend
        #[arg(long)]
        dry_run: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Best effort: a missing .env is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ensemble=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Models { capability } => cmd_models(capability.as_deref(), cli.format, cli.quiet),

        Commands::Strategies => cmd_strategies(cli.format),

        Commands::Route {
            task_type,
            capability,
            prefer,
        } => cmd_route(&task_type, &capability, prefer, cli.format, cli.quiet),

        Commands::Run {
            task_type,
            description,
            capability,
            prefer,
            strategy,
            context,
            dry_run,
        } => {
            let request = RunRequest {
                task_type,
                description,
                capabilities: capability,
                preferred: prefer,
                strategy,
                context,
                dry_run,
            };
            cmd_run(request, cli.format, cli.quiet).await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

fn parse_task_type(value: &str) -> anyhow::Result<TaskType> {
    value.parse().map_err(|e: String| anyhow!(e))
}

fn parse_capabilities(values: &[String]) -> anyhow::Result<Vec<Capability>> {
    values
        .iter()
        .map(|v| v.parse::<Capability>().map_err(|e| anyhow!(e)))
        .collect()
}

/// Split `key=value`; the value is parsed as JSON when possible
fn parse_context_pair(pair: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid context entry '{}': expected KEY=VALUE", pair))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Invalid context entry '{}': empty key", pair));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn build_task(
    config: &Config,
    task_type: &str,
    description: &str,
    capabilities: &[String],
    preferred: Vec<String>,
) -> anyhow::Result<TaskSpec> {
    let task_type = parse_task_type(task_type)?;
    let mut task = config
        .orchestration
        .task(task_type, description)
        .with_preferred_models(preferred);

    let capabilities = parse_capabilities(capabilities)?;
    if !capabilities.is_empty() {
        task = task.with_capabilities(capabilities);
    }

    Ok(task)
}

fn cmd_models(capability: Option<&str>, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let registry = ModelRegistry::with_defaults();
    let models = match capability {
        Some(c) => {
            let capability: Capability = c.parse().map_err(|e: String| anyhow!(e))?;
            registry.with_capability(capability)
        }
        None => registry.all().iter().collect(),
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if !quiet {
        println!("Registered models ({}):", models.len());
    }
    for model in models {
        let capabilities = model
            .capabilities
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {:<40} quality {:.2}  latency {:>5}ms  {}",
            model.name,
            model.quality_score,
            model.latency_estimate.as_millis(),
            capabilities
        );
    }
    Ok(())
}

fn cmd_strategies(format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let list: Vec<Value> = Strategy::ALL
            .iter()
            .map(|s| json!({"name": s.as_str(), "description": s.description()}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    for strategy in Strategy::ALL {
        println!("  {:<14} {}", strategy.as_str(), strategy.description());
    }
    Ok(())
}

fn cmd_route(
    task_type: &str,
    capabilities: &[String],
    preferred: Vec<String>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let task = build_task(&config, task_type, "route preview", capabilities, preferred)?;
    let orchestrator = Orchestrator::builder()
        .adapter(Arc::new(DryRunAdapter::new()))
        .config(config)
        .build()?;

    let ranked = orchestrator.rank(&task)?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    if ranked.is_empty() {
        println!("No eligible model for {}", task.task_type);
        return Ok(());
    }

    if !quiet {
        println!("Candidates for {}:", task.task_type);
    }
    for (i, candidate) in ranked.iter().enumerate() {
        println!(
            "  {}. {:<40} score {:.3}  ({} matching capabilities)",
            i + 1,
            candidate.model,
            candidate.score,
            candidate.capability_overlap
        );
    }
    Ok(())
}

struct RunRequest {
    task_type: String,
    description: String,
    capabilities: Vec<String>,
    preferred: Vec<String>,
    strategy: Option<String>,
    context: Vec<String>,
    dry_run: bool,
}

async fn cmd_run(request: RunRequest, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let task = build_task(
        &config,
        &request.task_type,
        &request.description,
        &request.capabilities,
        request.preferred,
    )?;

    let strategy = match request.strategy.as_deref() {
        Some(s) => s.parse::<Strategy>()?,
        None => config.orchestration.strategy()?,
    };

    let mut context = ExecutionContext::new();
    for pair in &request.context {
        let (key, value) = parse_context_pair(pair)?;
        context.insert(key, value);
    }

    let adapter: Arc<dyn ProviderAdapter> = if request.dry_run {
        Arc::new(DryRunAdapter::new())
    } else {
        let api_key = config.llm.resolved_api_key()?.ok_or_else(|| {
            anyhow!("No API key found. Set ENSEMBLE_API_KEY or OPENROUTER_API_KEY, or pass --dry-run.")
        })?;
        Arc::new(OpenRouterAdapter::new(config.llm.clone(), api_key)?)
    };

    info!(strategy = %strategy, adapter = adapter.name(), "Starting run");

    let orchestrator = Orchestrator::builder()
        .adapter(adapter)
        .config(config)
        .build()?;

    let result = orchestrator
        .orchestrate(&task, context, strategy)
        .await
        .map_err(|e| {
            let hint = e.suggestion().map(|s| format!("\n  hint: {}", s)).unwrap_or_default();
            anyhow!("[{}] {}{}", e.code(), e, hint)
        })
        .context("Orchestration failed")?;

    print_result(&result, &task, format, quiet)
}

fn print_result(
    result: &OrchestrationResult,
    task: &TaskSpec,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.primary_result);
    if quiet {
        return Ok(());
    }

    println!();
    println!("Strategy: {}", result.strategy_used);
    println!(
        "Quality: {:.2} (threshold {:.2}{})",
        result.quality_score,
        task.quality_threshold,
        if result.meets_threshold(task.quality_threshold) {
            ""
        } else {
            ", below"
        }
    );
    println!("Confidence: {:.2}", result.confidence);
    println!("Time: {:.2}s", result.total_execution_time.as_secs_f64());
    println!(
        "Tokens: {}  Cost: ${:.4}",
        result.total_tokens(),
        result.total_cost_usd()
    );
    println!("Attempts:");
    for response in &result.model_responses {
        match &response.error {
            None => println!(
                "  ok    {:<40} confidence {:.2}  {:.2}s",
                response.model_name,
                response.confidence,
                response.execution_time.as_secs_f64()
            ),
            Some(error) => println!("  fail  {:<40} {}", response.model_name, error),
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "ensemble",
            "--format",
            "json",
            "run",
            "--task-type",
            "code-review",
            "--description",
            "Review this",
            "--capability",
            "accessibility-review",
            "--capability",
            "code-review",
            "--context",
            "framework=react",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Run {
                capability,
                context,
                dry_run,
                strategy,
                ..
            } => {
                assert_eq!(capability.len(), 2);
                assert_eq!(context, vec!["framework=react".to_string()]);
                assert!(dry_run);
                assert!(strategy.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_parse_context_pair() {
        assert_eq!(
            parse_context_pair("framework=react").unwrap(),
            ("framework".to_string(), json!("react"))
        );
        assert_eq!(
            parse_context_pair("limits={\"width\": 320}").unwrap(),
            ("limits".to_string(), json!({"width": 320}))
        );
        assert_eq!(
            parse_context_pair("query=a=b").unwrap(),
            ("query".to_string(), json!("a=b"))
        );
        assert!(parse_context_pair("novalue").is_err());
        assert!(parse_context_pair("=x").is_err());
    }

    #[test]
    fn test_build_task_defaults_capability() {
        let config = Config::default();
        let task = build_task(&config, "test-generation", "Write tests", &[], Vec::new()).unwrap();
        assert_eq!(task.required_capabilities, vec![Capability::Testing]);

        let task = build_task(
            &config,
            "test-generation",
            "Write tests",
            &["code-generation".to_string()],
            vec!["openai/gpt-4o".to_string()],
        )
        .unwrap();
        assert_eq!(task.required_capabilities, vec![Capability::CodeGeneration]);
        assert_eq!(task.preferred_models, vec!["openai/gpt-4o".to_string()]);

        assert!(build_task(&config, "painting", "x", &[], Vec::new()).is_err());
    }
}

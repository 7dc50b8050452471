//! concord CLI - Ensemble answer extraction and voting for quantitative problems.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use concord::{Config, EvalPipeline, LlmClient, PythonExecutor, canonicalize, extract_equations, solve};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "concord")]
#[command(version)]
#[command(about = "Ensemble answer extraction and voting for quantitative problems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample, vote and score a problem set
    Run {
        /// Path to input problems JSONL file
        #[arg(short, long)]
        problems: PathBuf,

        /// Path to output JSONL file (overrides output.path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to text report (overrides output.report)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Only evaluate the first N problems
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Solve a comma-separated equation set
    Solve {
        /// Equations, e.g. "a = 4, b = a * 2, b = ?"
        equations: String,
    },

    /// Extract the equation set from a declarative solution file
    Extract {
        /// File holding the generated solution
        file: PathBuf,
    },

    /// Print the canonical form of an answer
    Canonicalize {
        value: String,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# concord configuration file

[engine]
# OpenAI-compatible completion server (llama.cpp, vLLM, ...)
base_url = "http://localhost:8080/v1"
# api_key = "${ENGINE_API_KEY}"
# api_key_env = "ENGINE_API_KEY"
model = "default"
timeout_secs = 180
max_retries = 3
max_tokens = 1024
temperature = 0.0
seed = 1337
concurrency = 4

[prompt]
user_start = "Q:"
user_end = ""
assistant_start = "A:"
assistant_end = "\n"
stop = ["Q:"]

[[methods]]
kind = "cot"
iterations = 5
exemplars = "prompts/cot.txt"

[[methods]]
kind = "declarative"
iterations = 5
exemplars = "prompts/declarative.txt"

[[methods]]
kind = "pal"
iterations = 5
exemplars = "prompts/pal.py"

[voting]
strategy = "mode"  # or "frequency"
seed = 1337
# early_stopping = 4
llm_decider = false
# decider_exemplars = "prompts/decider.txt"

[execution]
python = "python3"
timeout_secs = 5

[output]
path = "output/records.jsonl"
report = "output/report.txt"
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Canonicalize { value } => {
            println!("{}", canonicalize(&value));
            return Ok(());
        }

        Commands::Extract { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            println!("{}", extract_equations(&text));
            return Ok(());
        }

        Commands::Solve { equations } => {
            match solve(&equations) {
                Ok(value) => println!("{value}  (canonical: {})", canonicalize(value)),
                Err(tag) => println!("{tag}"),
            }
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!(
                "  Engine: {} ({})",
                config.engine.model, config.engine.base_url
            );
            for method in &config.methods {
                info!("  Method: {} x{}", method.kind, method.iterations);
            }
            info!(
                "  Samples per problem: {}",
                config.samples_per_problem()
            );
            info!(
                "  Voting: {:?}, early stopping {:?}, LLM decider {}",
                config.voting.strategy, config.voting.early_stopping, config.voting.llm_decider
            );
            return Ok(());
        }

        Commands::Run {
            problems,
            output,
            report,
            limit,
        } => {
            let config = load_config(&cli.config)?;

            let api_key = config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            let generator = Arc::new(LlmClient::new(&config.engine, api_key)?);
            let executor = Arc::new(PythonExecutor::new(config.execution.python.clone()));

            let output = output.unwrap_or_else(|| config.output.path.clone());
            let report = report.or_else(|| config.output.report.clone());

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }

            let mut problems_data = EvalPipeline::load_problems(&problems)?;
            if let Some(limit) = limit {
                problems_data.truncate(limit);
            }

            let mut pipeline = EvalPipeline::new(config, generator.clone(), executor)?;
            let stats = pipeline
                .run(problems_data, &output, report.as_deref())
                .await?;

            println!("\n=== Evaluation Complete ===");
            println!("Problems:    {}", stats.total_problems);
            println!("Samples:     {}", stats.total_samples);
            println!("Invalid:     {}", stats.invalid_samples);
            println!("Engine err:  {}", stats.engine_failures);
            println!("Exec err:    {}", stats.execution_failures);
            for (tag, count) in &stats.solver_failures {
                println!("Solver:      {tag}: {count}");
            }
            for (kind, count) in &stats.decisions {
                println!("Decided:     {kind}: {count}");
            }
            println!("Early stops: {}", stats.early_stops);
            println!("Correct:     {}", stats.total_correct);
            println!("Accuracy:    {:.3}", stats.accuracy);
            println!("Tokens:      {}", generator.total_completion_tokens());
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
            if let Some(report) = report {
                println!("Report:      {report:?}");
            }
        }
    }

    Ok(())
}

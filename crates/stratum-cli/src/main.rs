//! Stratum CLI - chunked, verified AI builds
//!
//! Usage:
//!   stratum init <spec>        Record the specification for a project
//!   stratum architect          Turn the specification into an architecture and plan
//!   stratum build              Run or resume the chunked build
//!   stratum review             Run reviewer agents over the finished build
//!   stratum status             Show pipeline and phase status
//!   stratum health <file>      Estimate a document's token usage
//!   stratum reset-phase        Reset the current phase to pending

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratum_agent::AnthropicAgent;
use stratum_context::{analyze_sections, ContextHealthReport};
use stratum_core::{StratumConfig, StratumError};
use stratum_orchestrator::{
    architect, init_project, reset_current_phase, review, BuildOutcome, FailureReport,
    Orchestrator, RecoveryChoice, RecoveryDecider, StateStore,
};
use stratum_verify::VerificationGate;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "stratum")]
#[command(author, version, about = "Chunked, verified AI builds")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root (defaults to current directory)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the specification and create .stratum/
    Init {
        /// Specification document (markdown)
        spec: PathBuf,
    },

    /// Have the architect agent design the build plan
    Architect,

    /// Run the chunked build, resuming where it stopped
    Build,

    /// Run reviewer agents over the finished build
    Review,

    /// Show pipeline and phase status
    Status {
        /// Print the raw state document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Estimate token usage of a document against the context budget
    Health {
        file: PathBuf,

        /// Budget in tokens (defaults to context.budget_tokens)
        #[arg(long)]
        budget: Option<usize>,
    },

    /// Reset the current phase to pending with a fresh fix budget
    ResetPhase,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = cli.project;
    let result = match cli.command {
        Commands::Init { spec } => cmd_init(&root, &spec).await,
        Commands::Architect => cmd_architect(&root).await,
        Commands::Build => cmd_build(&root).await,
        Commands::Review => cmd_review(&root).await,
        Commands::Status { json } => cmd_status(&root, json).await,
        Commands::Health { file, budget } => cmd_health(&root, &file, budget).await,
        Commands::ResetPhase => cmd_reset_phase(&root).await,
    };

    if let Err(e) = &result {
        if let Some(remedy) = e.downcast_ref::<StratumError>().and_then(StratumError::remedy) {
            eprintln!("Hint: {}", remedy);
        }
    }
    result
}

fn load_config(root: &Path) -> Result<StratumConfig> {
    StratumConfig::load_or_default(root).context("Failed to load .stratum/config.toml")
}

fn agent(config: &StratumConfig) -> Result<Arc<AnthropicAgent>> {
    Ok(Arc::new(AnthropicAgent::new(&config.agent)?))
}

async fn cmd_init(root: &Path, spec: &Path) -> Result<()> {
    info!("Initializing Stratum in {:?}", root);
    let doc = init_project(root, spec)
        .await
        .with_context(|| format!("Failed to initialize from {}", spec.display()))?;

    println!("Initialized Stratum run {}", doc.run_id);
    println!("Created:");
    println!("  .stratum/config.toml");
    println!("  .stratum/state.json");
    println!("\nNext: stratum architect");
    Ok(())
}

async fn cmd_architect(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let agent = agent(&config)?;
    let plan = architect(root, agent.as_ref()).await?;

    println!("{}", plan);
    println!("Architecture written to .stratum/architecture.md");
    println!("\nNext: stratum build");
    Ok(())
}

async fn cmd_build(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let agent = agent(&config)?;
    let gate = VerificationGate::from_config(&config.verification);

    let orchestrator = Orchestrator::new(root, config, agent, gate, Arc::new(StdinDecider))
        .with_activity_logging();

    match orchestrator.build().await? {
        BuildOutcome::Completed { phases, skipped } => {
            println!("\nBuild complete: {} phases ({} skipped)", phases, skipped);
            println!("Next: stratum review");
        }
        BuildOutcome::Paused {
            phase_index,
            phase_name,
            manual_fix,
        } => {
            println!("\nBuild paused at phase {}: {}", phase_index + 1, phase_name);
            println!("Fix notes: {}", manual_fix.display());
            println!("Fix the errors, then run `stratum build` to re-verify and continue.");
        }
    }
    Ok(())
}

async fn cmd_review(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let agent = agent(&config)?;
    let path = review(root, agent.as_ref(), &config).await?;
    println!("Review written to {}", path.display());
    Ok(())
}

async fn cmd_status(root: &Path, json: bool) -> Result<()> {
    let store = StateStore::new(root);
    let doc = store.load_required().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Stratum Status");
    println!("==============");
    print!("{}", doc);
    if !doc.attempt_log.is_empty() {
        println!("\nFix attempts on current phase:");
        for (idx, line) in doc.attempt_log.iter().enumerate() {
            println!("  {}. {}", idx + 1, line);
        }
    }
    Ok(())
}

/// Split markdown into `(heading, body)` sections
fn markdown_sections(text: &str) -> Vec<(String, String)> {
    let mut sections = vec![("(preamble)".to_string(), String::new())];
    for line in text.lines() {
        if line.starts_with('#') {
            let heading = line.trim_start_matches('#').trim().to_string();
            sections.push((heading, String::new()));
        }
        if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }
    sections.retain(|(_, body)| !body.trim().is_empty());
    sections
}

fn print_health(report: &ContextHealthReport) {
    println!(
        "{} / {} tokens ({}%): {}",
        report.total_tokens, report.budget_tokens, report.percentage_used, report.status
    );
    if !report.breakdown.is_empty() {
        println!("\nLargest sections:");
        for section in report.breakdown.iter().take(10) {
            println!(
                "  {:>7} tokens  {:>3}%  {}",
                section.tokens, section.percentage_of_budget, section.name
            );
        }
    }
    for recommendation in &report.recommendations {
        println!("- {}", recommendation);
    }
}

async fn cmd_health(root: &Path, file: &Path, budget: Option<usize>) -> Result<()> {
    let budget = match budget {
        Some(budget) => budget,
        None => load_config(root)?.context.budget_tokens,
    };
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let sections = markdown_sections(&text);
    let borrowed: Vec<(&str, &str)> = sections
        .iter()
        .map(|(name, body)| (name.as_str(), body.as_str()))
        .collect();
    print_health(&analyze_sections(&borrowed, budget));
    Ok(())
}

async fn cmd_reset_phase(root: &Path) -> Result<()> {
    let name = reset_current_phase(root).await?;
    println!("Reset phase '{}' to pending", name);
    Ok(())
}

/// Asks the operator on stdin; no terminal or EOF means pause
struct StdinDecider;

#[async_trait]
impl RecoveryDecider for StdinDecider {
    async fn decide(&self, report: &FailureReport) -> RecoveryChoice {
        eprintln!("\n{}", report.summary());

        if !std::io::stdin().is_terminal() {
            eprintln!("No interactive input; pausing.");
            return RecoveryChoice::Pause;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("[p]ause, [s]kip, or [r]etry? ");
            match lines.next_line().await {
                Ok(Some(line)) => match line.parse() {
                    Ok(choice) => return choice,
                    Err(e) => eprintln!("{}", e),
                },
                Ok(None) | Err(_) => return RecoveryChoice::Pause,
            }
        }
    }
}

//! Convoy CLI — the main entry point.
//!
//! Commands:
//! - `run`        — Orchestrate parallel agents for one request (or interactively)
//! - `providers`  — List built-in LLM providers
//! - `config`     — Show, locate, initialise or validate the config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "Convoy — parallel AI agents, one merged answer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Use this provider instead of the configured default
    #[arg(long, global = true, env = "CONVOY_PROVIDER")]
    provider: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a request, run agents in parallel and merge their answers
    Run {
        /// Handle a single request instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Override the number of parallel agents
        #[arg(short, long)]
        agents: Option<usize>,

        /// Override the per-agent timeout, in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the full result (artifact, counts, outcomes) as JSON
        #[arg(long)]
        json: bool,
    },

    /// List built-in LLM providers
    Providers,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run {
            message,
            agents,
            timeout,
            json,
        } => {
            let options = commands::run::RunOptions {
                provider: cli.provider,
                agents,
                timeout_secs: timeout,
                json,
            };
            commands::run::run(message, options).await?
        }
        Commands::Providers => commands::providers::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}

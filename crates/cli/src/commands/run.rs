//! `convoy run` — Single-request or interactive orchestration.

use convoy_agent::Orchestrator;
use convoy_config::AppConfig;
use convoy_core::event::{DomainEvent, EventBus};
use convoy_core::task::{AggregatedResult, Outcome, Request};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct RunOptions {
    pub provider: Option<String>,
    pub agents: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

const EXIT_WORDS: &[&str] = &["quit", "exit", "bye"];

pub async fn run(message: Option<String>, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(agents) = options.agents {
        config.orchestrator.parallel_agents = agents;
    }
    if let Some(timeout) = options.timeout_secs {
        config.orchestrator.task_timeout_secs = timeout;
    }
    config.validate()?;

    let router = convoy_providers::build_from_config(&config, options.provider.as_deref());
    let provider = router.default().ok_or("No default provider configured")?;
    let provider_name = provider.name().to_string();

    if provider_name != "ollama" && config.api_key_for(&provider_name).is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{provider_name}'!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    CONVOY_API_KEY, OPENROUTER_API_KEY, OPENAI_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let model = convoy_providers::model_for(&config, &provider_name).ok_or_else(|| {
        format!("No model configured for '{provider_name}'; set default_model under [providers.{provider_name}]")
    })?;
    tracing::info!(provider = %provider_name, model = %model, "Using provider");
    let tools = Arc::new(convoy_tools::default_registry());
    tracing::debug!(tools = ?tools.names(), "Tool registry ready");
    let events = Arc::new(EventBus::default());
    let orchestrator = Orchestrator::from_config(&config, provider, &model, tools, events.clone());

    if let Some(message) = message {
        let result = orchestrate(&orchestrator, &events, &message, options.json).await?;
        print_result(&result, options.json)?;
        return Ok(());
    }

    println!();
    println!("  Convoy — Interactive Mode");
    println!();
    println!("  Provider:  {provider_name}");
    println!("  Model:     {model}");
    println!(
        "  Agents:    {} (timeout {}s each)",
        config.orchestrator.parallel_agents, config.orchestrator.task_timeout_secs
    );
    println!();
    println!("  Type a request and press Enter. 'quit', 'exit' or 'bye' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&input.to_lowercase().as_str()) {
            break;
        }

        match orchestrate(&orchestrator, &events, input, options.json).await {
            Ok(result) => print_result(&result, options.json)?,
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one request, printing agent status lines as events arrive unless
/// `quiet` is set.
async fn orchestrate(
    orchestrator: &Orchestrator,
    events: &EventBus,
    input: &str,
    quiet: bool,
) -> Result<AggregatedResult, convoy_core::Error> {
    let request = Request::new(input);
    let mut rx = events.subscribe();
    let run = orchestrator.run(&request);
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            event = rx.recv() => {
                if let Ok(event) = event {
                    show_status(&event, quiet);
                }
            }
        }
    };
    while let Ok(event) = rx.try_recv() {
        show_status(&event, quiet);
    }
    result
}

fn show_status(event: &DomainEvent, quiet: bool) {
    if quiet {
        return;
    }
    if let Some(line) = status_line(event) {
        eprintln!("  {line}");
    }
}

fn status_line(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::TasksDecomposed { count, fallback: false, .. } => {
            Some(format!("Split into {count} tasks"))
        }
        DomainEvent::TasksDecomposed { count, fallback: true, .. } => Some(format!(
            "Task generation failed; all {count} agents get the original request"
        )),
        DomainEvent::AgentQueued { .. } => None,
        DomainEvent::AgentStarted { index, .. } => Some(format!("Agent {}  running", index + 1)),
        DomainEvent::AgentFinished { index, status, iterations, .. } => Some(format!(
            "Agent {}  {status} after {iterations} iteration(s)",
            index + 1
        )),
        DomainEvent::ToolExecuted { agent_index, tool_name, success, .. } => Some(format!(
            "Agent {}  {} {tool_name}",
            agent_index + 1,
            if *success { "used" } else { "failed calling" }
        )),
        DomainEvent::AggregationFinished { contributors, synthesized: true, .. } => {
            Some(format!("Synthesized {contributors} answers"))
        }
        DomainEvent::AggregationFinished { .. } => None,
    }
}

fn print_result(result: &AggregatedResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!();
    println!("{}", result.artifact);
    println!();
    println!(
        "  Agents: {} completed, {} failed, {} timed out",
        result.counts.completed, result.counts.failed, result.counts.timed_out
    );
    for (index, outcome) in result.outcomes.iter().enumerate() {
        if let Outcome::Failed { kind, detail, .. } = outcome {
            println!("    Agent {}: {kind}: {detail}", index + 1);
        }
    }
    println!();
    Ok(())
}

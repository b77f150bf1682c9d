//! `convoy config` — Configuration management commands.

use convoy_config::AppConfig;

const MASK: &str = "********";

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&masked(config))?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("Config error: {e}");
            return Err(e.into());
        }
    };

    println!("Config OK");
    if config.api_key_for(&config.default_provider).is_none() && config.default_provider != "ollama" {
        println!("  warning: no API key for provider '{}'", config.default_provider);
    }
    let orchestrator = &config.orchestrator;
    println!("  Provider:     {}", config.default_provider);
    let model = convoy_providers::model_for(&config, &config.default_provider);
    println!("  Model:        {}", model.as_deref().unwrap_or("(none; set default_model)"));
    println!(
        "  Agents:       {} (at most {} at once)",
        orchestrator.parallel_agents,
        orchestrator.concurrency()
    );
    println!("  Timeout:      {}s per agent", orchestrator.task_timeout_secs);
    println!("  Iterations:   {} per agent", config.agent.max_iterations);
    println!("  Aggregation:  {}", orchestrator.aggregation_strategy);
    Ok(())
}

/// Replace every secret with a fixed mask.
fn masked(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    config
}

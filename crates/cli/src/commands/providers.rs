//! `convoy providers` — List built-in LLM providers.

use convoy_providers::BUILTIN_PROVIDERS;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Built-in providers (all OpenAI-compatible):");
    println!();
    print!("{}", render_table());
    println!();
    println!("  Pick one with `--provider <name>`, CONVOY_PROVIDER, or in config.toml:");
    println!("    default_provider = \"groq\"");
    println!("    [providers.groq]");
    println!("    api_key = \"...\"");
    println!("    default_model = \"llama-3.3-70b-versatile\"");
    println!();
    println!("  Any other OpenAI-compatible endpoint works by setting `api_url`.");
    Ok(())
}

fn render_table() -> String {
    let name_width = BUILTIN_PROVIDERS.iter().map(|p| p.name.len()).max().unwrap_or(0);
    let url_width = BUILTIN_PROVIDERS.iter().map(|p| p.base_url.len()).max().unwrap_or(0);
    let model_width = BUILTIN_PROVIDERS.iter().map(|p| p.default_model.len()).max().unwrap_or(0);

    BUILTIN_PROVIDERS
        .iter()
        .map(|p| {
            format!(
                "  {:<name_width$}  {:<url_width$}  {:<model_width$}  {}\n",
                p.name, p.base_url, p.default_model, p.description
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_provider_once() {
        let table = render_table();
        assert_eq!(table.lines().count(), BUILTIN_PROVIDERS.len());
        assert!(table.contains("openrouter"));
        assert!(table.contains("localhost:11434"));
        assert!(table.contains("llama-3.3-70b-versatile"));
    }
}

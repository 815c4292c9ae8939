//! Diagnostic command to check installation.

use chatbridge_core::Config;
use chatbridge_providers::{OpenAIProvider, Provider};
use chatbridge_tools::WebSearchTool;

use crate::AppContext;

pub fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let config = &ctx.config;
    println!("Running diagnostics...\n");

    // Check config directory
    let config_dir = Config::config_dir();
    println!("Config directory: {:?}", config_dir);
    if config_dir.join("config.toml").exists() {
        println!("  ✓ config.toml found");
    } else {
        println!("  ✗ No config.toml (defaults and environment are used)");
    }

    // Check configuration
    println!("\nConfiguration:");
    let result = config.validate();
    if result.issues.is_empty() {
        println!("  ✓ Valid");
    }
    for issue in &result.issues {
        println!("  ✗ {}: {}", issue.field, issue.message);
    }

    // Check model provider
    println!("\nModel:");
    let provider = OpenAIProvider::new(config.model.resolve_api_key().unwrap_or_default());
    let key_env = config.model.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
    if provider.is_configured() {
        println!("  ✓ {} API key found", provider.name());
    } else {
        println!("  ✗ {} API key missing (set {})", provider.name(), key_env);
    }
    println!("  Model: {}", config.model.model);
    if let Some(ref base_url) = config.model.base_url {
        println!("  Base URL: {}", base_url);
    }

    // Check search
    println!("\nWeb search:");
    let search_env = config.search.api_key_env.as_deref().unwrap_or("TAVILY_API_KEY");
    if WebSearchTool::from_config(&config.search).is_available() {
        println!("  ✓ Search API key found");
    } else {
        println!("  ✗ Search API key missing (set {}); searches will report unavailable", search_env);
    }
    println!("  Endpoint: {}", config.search.endpoint);

    println!("\nDiagnostics complete.");
    Ok(())
}

//! Configuration management commands.

use chatbridge_core::Config;

use crate::{AppContext, ConfigAction};

const MASK: &str = "********";

pub fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", masked(&ctx.config).to_toml()?);
        }
        ConfigAction::Validate => {
            let result = ctx.config.validate();
            if result.issues.is_empty() {
                println!("✓ Configuration is valid");
            }
            for issue in result.errors() {
                println!("✗ {}: {}", issue.field, issue.message);
            }
            for issue in result.warnings() {
                println!("! {}: {}", issue.field, issue.message);
            }
            if !result.is_ok() {
                anyhow::bail!("Configuration has {} error(s)", result.errors().len());
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_dir().join("config.toml").display());
        }
    }
    Ok(())
}

/// Copy of the config with inline secrets hidden.
fn masked(config: &Config) -> Config {
    let mut config = config.clone();
    if config.model.api_key.is_some() {
        config.model.api_key = Some(MASK.to_string());
    }
    if config.search.api_key.is_some() {
        config.search.api_key = Some(MASK.to_string());
    }
    config
}

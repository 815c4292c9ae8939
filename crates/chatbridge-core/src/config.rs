//! Configuration system for Chatbridge.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::conversation::DEFAULT_HISTORY_WINDOW;
use crate::error::Error;

/// Main configuration struct for Chatbridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model provider settings
    pub model: ModelConfig,
    /// Web search settings
    pub search: SearchConfig,
    /// Agent behaviour
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider label used in logs and errors
    pub provider: String,
    /// Model to use
    pub model: String,
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Base URL (optional, for compatible endpoints)
    pub base_url: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            base_url: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl ModelConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Search endpoint
    pub endpoint: String,
    /// Search depth: basic or advanced
    pub search_depth: String,
    /// Maximum results per query
    pub max_results: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: Some("TAVILY_API_KEY".to_string()),
            endpoint: "https://api.tavily.com/search".to_string(),
            search_depth: "advanced".to_string(),
            max_results: 5,
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Non-system turns kept in context
    pub history_window: usize,
    /// Minimum time between partial message updates
    pub flush_interval_ms: u64,
    /// Maximum consecutive tool-call rounds per message
    pub max_tool_rounds: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            flush_interval_ms: 1000,
            max_tool_rounds: 5,
        }
    }
}

fn resolve_key(direct: Option<&str>, env_var: Option<&str>) -> Option<String> {
    if let Some(key) = direct.filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    env_var
        .and_then(|var| std::env::var(var).ok())
        .filter(|k| !k.is_empty())
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error).collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning).collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "agent.history_window")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(None).extract()
    }

    /// Load configuration, layering an explicit file on top of the defaults.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, figment::Error> {
        Self::figment(Some(path.into())).extract()
    }

    fn figment(extra: Option<PathBuf>) -> Figment {
        let mut figment = Figment::new()
            // Default values
            .merge(figment::providers::Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(Self::config_dir().join("config.toml")))
            // Project config
            .merge(Toml::file(".chatbridge/config.toml"));

        if let Some(path) = extra {
            figment = figment.merge(Toml::file(path));
        }

        // Environment variables, e.g. CHATBRIDGE_MODEL__BASE_URL
        figment.merge(Env::prefixed("CHATBRIDGE_").split("__"))
    }

    /// Load and validate configuration.
    pub fn load_validated(path: Option<PathBuf>) -> Result<Self, Error> {
        let config = match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
        .map_err(|e| Error::Config(e.to_string()))?;

        let result = config.validate();
        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.model.model.is_empty() {
            result.add_error("model.model", "Model name cannot be empty");
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            result.add_error("model.temperature", "temperature must be between 0.0 and 2.0");
        }

        if let Some(ref base_url) = self.model.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                result.add_error("model.base_url", "base_url must start with http:// or https://");
            }
        }

        if self.model.api_key.as_ref().map(|k| k.is_empty()).unwrap_or(false) {
            result.add_warning("model.api_key", "API key is empty string");
        }

        if !self.search.endpoint.starts_with("http://") && !self.search.endpoint.starts_with("https://") {
            result.add_error("search.endpoint", "endpoint must start with http:// or https://");
        }

        let valid_depths = ["basic", "advanced"];
        if !valid_depths.contains(&self.search.search_depth.as_str()) {
            result.add_error(
                "search.search_depth",
                format!(
                    "Invalid search depth '{}'. Valid values: {:?}",
                    self.search.search_depth, valid_depths
                ),
            );
        }

        if self.search.max_results == 0 {
            result.add_error("search.max_results", "max_results must be greater than 0");
        }

        if self.agent.history_window == 0 {
            result.add_error("agent.history_window", "history_window must be greater than 0");
        }

        if self.agent.flush_interval_ms == 0 {
            result.add_warning(
                "agent.flush_interval_ms",
                "flush_interval_ms of 0 updates the message on every fragment",
            );
        }

        if self.agent.max_tool_rounds == 0 {
            result.add_warning("agent.max_tool_rounds", "tool calls will always fail with max_tool_rounds = 0");
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("chatbridge"))
            .unwrap_or_else(|| PathBuf::from("~/.config/chatbridge"))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
    }

    #[test]
    fn test_defaults_match_bridge_behaviour() {
        let config = Config::default();
        assert_eq!(config.model.temperature, 0.7);
        assert_eq!(config.agent.history_window, 20);
        assert_eq!(config.agent.flush_interval_ms, 1000);
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.search_depth, "advanced");
    }

    #[test]
    fn test_invalid_search_depth() {
        let mut config = Config::default();
        config.search.search_depth = "deep".to_string();
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result.errors().iter().any(|e| e.field == "search.search_depth"));
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.model.base_url = Some("api.example.com".to_string());
        let result = config.validate();
        assert!(result.errors().iter().any(|e| e.field == "model.base_url"));
    }

    #[test]
    fn test_zero_window_is_error() {
        let mut config = Config::default();
        config.agent.history_window = 0;
        assert!(!config.validate().is_ok());
    }

    #[test]
    fn test_zero_flush_interval_is_warning() {
        let mut config = Config::default();
        config.agent.flush_interval_ms = 0;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result.warnings().iter().any(|e| e.field == "agent.flush_interval_ms"));
    }

    #[test]
    fn test_direct_key_wins() {
        let model = ModelConfig {
            api_key: Some("sk-direct".to_string()),
            api_key_env: Some("CHATBRIDGE_TEST_UNSET_KEY".to_string()),
            ..Default::default()
        };
        assert_eq!(model.resolve_api_key().as_deref(), Some("sk-direct"));
    }

    #[test]
    fn test_missing_key_resolves_none() {
        let search = SearchConfig {
            api_key: None,
            api_key_env: Some("CHATBRIDGE_TEST_DEFINITELY_UNSET".to_string()),
            ..Default::default()
        };
        assert!(search.resolve_api_key().is_none());
    }

    #[test]
    fn test_to_toml_contains_sections() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[model]"));
        assert!(rendered.contains("[agent]"));
    }
}

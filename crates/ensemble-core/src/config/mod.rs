//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::Strategy;
use crate::provider::OPENROUTER_BASE_URL;
use crate::routing::{MAX_CANDIDATES, TaskSpec, TaskType};

/// Ensemble configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub referer: String,
    pub app_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub default_strategy: String,
    pub max_execution_time_secs: u64,
    pub quality_threshold: f64,
    pub retry_attempts: u32,
    pub assistant_override_threshold: f64,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub max_candidates: usize,
    pub use_performance_history: bool,
    pub history_weight: f64,
    pub min_samples: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENROUTER_BASE_URL.to_string(),
            timeout_secs: 120,
            referer: "https://github.com/ensemble-dev/ensemble".to_string(),
            app_title: "Ensemble".to_string(),
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_strategy: "parallel".to_string(),
            max_execution_time_secs: 60,
            quality_threshold: 0.7,
            retry_attempts: 1,
            assistant_override_threshold: 0.7,
            history_limit: 100,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            use_performance_history: false,
            history_weight: 0.2,
            min_samples: 5,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("ENSEMBLE_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(|key| redact(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl OrchestrationConfig {
    /// Parsed default strategy
    pub fn strategy(&self) -> crate::Result<Strategy> {
        self.default_strategy.parse()
    }

    /// Task spec for a task type with the configured limits applied
    pub fn task(&self, task_type: TaskType, description: impl Into<String>) -> TaskSpec {
        TaskSpec::new(task_type, description)
            .with_max_execution_time(Duration::from_secs(self.max_execution_time_secs))
            .with_quality_threshold(self.quality_threshold)
            .with_retry_attempts(self.retry_attempts)
    }
}

fn redact(key: &str) -> String {
    let chars = key.chars().count();
    if chars <= 4 {
        return "***".to_string();
    }
    match key.char_indices().nth(chars - 4) {
        Some((start, _)) => format!("***{}", &key[start..]),
        None => "***".to_string(),
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("ENSEMBLE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("ensemble")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        self.orchestration
            .strategy()
            .map_err(|e| anyhow!("{}", e))?;
        check_max_candidates(self.routing.max_candidates)?;
        check_unit_interval("orchestration.quality_threshold", self.orchestration.quality_threshold)?;
        check_unit_interval(
            "orchestration.assistant_override_threshold",
            self.orchestration.assistant_override_threshold,
        )?;
        check_unit_interval("routing.history_weight", self.routing.history_weight)?;
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // LLM settings
            "llm.base_url" => Ok(self.llm.base_url.clone()),
            "llm.timeout_secs" => Ok(self.llm.timeout_secs.to_string()),

            // Orchestration settings
            "orchestration.default_strategy" => Ok(self.orchestration.default_strategy.clone()),
            "orchestration.max_execution_time_secs" => {
                Ok(self.orchestration.max_execution_time_secs.to_string())
            }
            "orchestration.quality_threshold" => Ok(self.orchestration.quality_threshold.to_string()),
            "orchestration.retry_attempts" => Ok(self.orchestration.retry_attempts.to_string()),
            "orchestration.assistant_override_threshold" => {
                Ok(self.orchestration.assistant_override_threshold.to_string())
            }
            "orchestration.history_limit" => Ok(self.orchestration.history_limit.to_string()),

            // Routing settings
            "routing.max_candidates" => Ok(self.routing.max_candidates.to_string()),
            "routing.use_performance_history" => {
                Ok(self.routing.use_performance_history.to_string())
            }
            "routing.history_weight" => Ok(self.routing.history_weight.to_string()),
            "routing.min_samples" => Ok(self.routing.min_samples.to_string()),

            // API key (special handling - show redacted)
            "llm.api_key" | "api_key" => match self.llm.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use ENSEMBLE_API_KEY or OPENROUTER_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `ensemble config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            // LLM settings
            "llm.base_url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(anyhow!("Base URL must start with http:// or https://"));
                }
                self.llm.base_url = value.trim_end_matches('/').to_string();
            }
            "llm.timeout_secs" => {
                self.llm.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            // Orchestration settings
            "orchestration.default_strategy" => {
                let strategy: Strategy = value.parse().map_err(|e| anyhow!("{}", e))?;
                self.orchestration.default_strategy = strategy.to_string();
            }
            "orchestration.max_execution_time_secs" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid max_execution_time_secs value: {}", value))?;
                if secs == 0 {
                    return Err(anyhow!("Max execution time must be at least 1 second"));
                }
                self.orchestration.max_execution_time_secs = secs;
            }
            "orchestration.quality_threshold" => {
                self.orchestration.quality_threshold = parse_unit_interval(key, value)?;
            }
            "orchestration.retry_attempts" => {
                self.orchestration.retry_attempts = value
                    .parse()
                    .with_context(|| format!("Invalid retry_attempts value: {}", value))?;
            }
            "orchestration.assistant_override_threshold" => {
                self.orchestration.assistant_override_threshold = parse_unit_interval(key, value)?;
            }
            "orchestration.history_limit" => {
                self.orchestration.history_limit = value
                    .parse()
                    .with_context(|| format!("Invalid history_limit value: {}", value))?;
            }

            // Routing settings
            "routing.max_candidates" => {
                let max: usize = value
                    .parse()
                    .with_context(|| format!("Invalid max_candidates value: {}", value))?;
                check_max_candidates(max)?;
                self.routing.max_candidates = max;
            }
            "routing.use_performance_history" => {
                self.routing.use_performance_history = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "routing.history_weight" => {
                self.routing.history_weight = parse_unit_interval(key, value)?;
            }
            "routing.min_samples" => {
                self.routing.min_samples = value
                    .parse()
                    .with_context(|| format!("Invalid min_samples value: {}", value))?;
            }

            // API key cannot be set via config
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the ENSEMBLE_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `ensemble config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "llm.base_url",
            "llm.timeout_secs",
            "llm.api_key",
            "orchestration.default_strategy",
            "orchestration.max_execution_time_secs",
            "orchestration.quality_threshold",
            "orchestration.retry_attempts",
            "orchestration.assistant_override_threshold",
            "orchestration.history_limit",
            "routing.max_candidates",
            "routing.use_performance_history",
            "routing.history_weight",
            "routing.min_samples",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_unit_interval(key: &str, value: &str) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    check_unit_interval(key, parsed)?;
    Ok(parsed)
}

fn check_unit_interval(key: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(())
}

fn check_max_candidates(max: usize) -> anyhow::Result<()> {
    if !(1..=MAX_CANDIDATES).contains(&max) {
        return Err(anyhow!(
            "routing.max_candidates must be between 1 and {}",
            MAX_CANDIDATES
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestration.strategy().unwrap(), Strategy::Parallel);
        assert_eq!(config.routing.max_candidates, 3);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("orchestration.default_strategy", "Hierarchical").unwrap();
        config.set("routing.use_performance_history", "true").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.orchestration.default_strategy, "hierarchical");
        assert!(loaded.routing.use_performance_history);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.orchestration.history_limit, 100);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[routing]\nmax_candidates = 2\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.routing.max_candidates, 2);
        assert_eq!(config.orchestration.default_strategy, "parallel");
    }

    #[test]
    fn test_api_key_in_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[llm]\napi_key = \"sk-nope\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_set_validation() {
        let mut config = Config::default();

        assert!(config.set("orchestration.default_strategy", "round-robin").is_err());
        assert!(config.set("orchestration.quality_threshold", "1.2").is_err());
        assert!(config.set("orchestration.max_execution_time_secs", "0").is_err());
        assert!(config.set("routing.max_candidates", "0").is_err());
        assert!(config.set("routing.max_candidates", "4").is_err());
        assert_eq!(config.routing.max_candidates, 3);
        assert!(config.set("llm.base_url", "ftp://nope").is_err());
        assert!(config.set("llm.api_key", "sk-123").is_err());
        assert!(config.set("unknown.key", "1").is_err());

        config.set("orchestration.quality_threshold", "0.85").unwrap();
        assert_eq!(config.get("orchestration.quality_threshold").unwrap(), "0.85");
    }

    #[test]
    fn test_list_covers_all_keys() {
        let config = Config::default();
        let items = config.list().unwrap();
        assert_eq!(items.len(), 13);
        assert!(items.iter().any(|(k, _)| k == "routing.min_samples"));
    }

    #[test]
    fn test_task_applies_limits() {
        let mut config = OrchestrationConfig::default();
        config.max_execution_time_secs = 5;
        config.quality_threshold = 0.9;

        let task = config.task(TaskType::CodeReview, "review");
        assert_eq!(task.max_execution_time, Duration::from_secs(5));
        assert_eq!(task.quality_threshold, 0.9);
    }

    #[test]
    fn test_out_of_range_file_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        for contents in [
            "[orchestration]\nquality_threshold = 2.0\n",
            "[orchestration]\nassistant_override_threshold = -0.1\n",
            "[routing]\nhistory_weight = 1.5\n",
            "[routing]\nmax_candidates = 6\n",
        ] {
            fs::write(&path, contents).unwrap();
            assert!(Config::load_from(&path).is_err(), "{contents}");
        }
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("abc"), "***");
        assert_eq!(redact("sk-or-12345678"), "***5678");
        assert_eq!(redact("clé-ünïcødé"), "***cødé");
        assert_eq!(redact("äöüß"), "***");
    }
}

//! Configuration loading, validation, and management for StepForge.
//!
//! Loads configuration from `~/.stepforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.stepforge/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plan parsing and execution settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Execution trace settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// How the parser treats lines that look like steps but are malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Skip malformed lines, keep diagnostics.
    #[default]
    Lenient,
    /// Reject the plan if any line is malformed.
    Strict,
}

/// How steps are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingKind {
    /// One step at a time, ascending index order.
    #[default]
    Sequential,
    /// Independent steps run concurrently.
    Parallel,
}

/// What happens when a tool invocation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicyKind {
    /// Halt the plan at the failing step.
    #[default]
    FailFast,
    /// Record the failure and keep going.
    Continue,
    /// Retry with backoff, then halt.
    Retry,
}

impl FromStr for ParseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::ValidationError(format!(
                "unknown parse mode '{other}' (expected lenient|strict)"
            ))),
        }
    }
}

impl FromStr for SchedulingKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(ConfigError::ValidationError(format!(
                "unknown scheduling '{other}' (expected sequential|parallel)"
            ))),
        }
    }
}

impl FromStr for FailurePolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "continue" => Ok(Self::Continue),
            "retry" => Ok(Self::Retry),
            other => Err(ConfigError::ValidationError(format!(
                "unknown failure policy '{other}' (expected fail_fast|continue|retry)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub parse_mode: ParseMode,

    #[serde(default)]
    pub scheduling: SchedulingKind,

    /// Upper bound on concurrently running steps in parallel mode
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicyKind,

    /// Total attempts per step under the retry policy
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Base backoff between retries (multiplied by the attempt number)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-invocation deadline; unset means no deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,

    /// Reject plans whose back-references cannot all be resolved
    #[serde(default)]
    pub strict_references: bool,

    /// Ask the responder for a final answer instead of returning the last observation
    #[serde(default = "default_true")]
    pub synthesize: bool,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parse_mode: ParseMode::default(),
            scheduling: SchedulingKind::default(),
            max_concurrency: default_max_concurrency(),
            failure_policy: FailurePolicyKind::default(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            step_timeout_secs: None,
            strict_references: false,
            synthesize: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Results returned by the web search tool
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,

    /// Characters of search results handed to the summarizer
    #[serde(default = "default_search_context_chars")]
    pub search_context_chars: usize,
}

fn default_search_result_limit() -> usize {
    3
}
fn default_search_context_chars() -> usize {
    8000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_result_limit: default_search_result_limit(),
            search_context_chars: default_search_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Traces retained in memory
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

fn default_max_traces() -> usize {
    5_000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_traces: default_max_traces(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepforge/config.toml).
    ///
    /// Environment variables override file values:
    /// - `STEPFORGE_PARSE_MODE`
    /// - `STEPFORGE_SCHEDULING`
    /// - `STEPFORGE_MAX_CONCURRENCY`
    /// - `STEPFORGE_FAILURE_POLICY`
    /// - `STEPFORGE_STEP_TIMEOUT_SECS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("STEPFORGE_PARSE_MODE") {
            self.engine.parse_mode = mode.parse()?;
        }
        if let Some(scheduling) = lookup("STEPFORGE_SCHEDULING") {
            self.engine.scheduling = scheduling.parse()?;
        }
        if let Some(n) = lookup("STEPFORGE_MAX_CONCURRENCY") {
            self.engine.max_concurrency = n.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("STEPFORGE_MAX_CONCURRENCY is not a number: {n}"))
            })?;
        }
        if let Some(policy) = lookup("STEPFORGE_FAILURE_POLICY") {
            self.engine.failure_policy = policy.parse()?;
        }
        if let Some(secs) = lookup("STEPFORGE_STEP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("STEPFORGE_STEP_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            self.engine.step_timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepforge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_concurrency must be at least 1".into(),
            ));
        }

        if self.engine.retry_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "engine.retry_max_attempts must be at least 1".into(),
            ));
        }

        if self.engine.step_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "engine.step_timeout_secs must be > 0 when set".into(),
            ));
        }

        if self.tools.search_result_limit == 0 {
            return Err(ConfigError::ValidationError(
                "tools.search_result_limit must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.parse_mode, ParseMode::Lenient);
        assert_eq!(config.engine.scheduling, SchedulingKind::Sequential);
        assert_eq!(config.engine.failure_policy, FailurePolicyKind::FailFast);
        assert_eq!(config.tools.search_context_chars, 8000);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine.max_concurrency, config.engine.max_concurrency);
        assert_eq!(parsed.engine.synthesize, config.engine.synthesize);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.engine.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.engine.step_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.engine.max_concurrency, 4);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[engine]
parse_mode = "strict"
scheduling = "parallel"
max_concurrency = 8
failure_policy = "retry"
step_timeout_secs = 30
synthesize = false

[tools]
search_result_limit = 5
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.engine.parse_mode, ParseMode::Strict);
        assert_eq!(config.engine.scheduling, SchedulingKind::Parallel);
        assert_eq!(config.engine.max_concurrency, 8);
        assert_eq!(config.engine.failure_policy, FailurePolicyKind::Retry);
        assert_eq!(config.engine.step_timeout_secs, Some(30));
        assert!(!config.engine.synthesize);
        assert_eq!(config.tools.search_result_limit, 5);
        assert_eq!(config.tools.search_context_chars, 8000);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nparse_mode = \"sloppy\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STEPFORGE_PARSE_MODE", "strict"),
            ("STEPFORGE_SCHEDULING", "parallel"),
            ("STEPFORGE_MAX_CONCURRENCY", "2"),
            ("STEPFORGE_FAILURE_POLICY", "fail-fast"),
            ("STEPFORGE_STEP_TIMEOUT_SECS", "9"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.engine.parse_mode, ParseMode::Strict);
        assert_eq!(config.engine.scheduling, SchedulingKind::Parallel);
        assert_eq!(config.engine.max_concurrency, 2);
        assert_eq!(config.engine.failure_policy, FailurePolicyKind::FailFast);
        assert_eq!(config.engine.step_timeout_secs, Some(9));
    }

    #[test]
    fn bad_env_override_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|k| (k == "STEPFORGE_MAX_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("STEPFORGE_MAX_CONCURRENCY"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("lenient"));
        assert!(toml_str.contains("fail_fast"));
    }
}

//! Settings
//!
//! Typed configuration loaded once at startup from the environment (and a
//! `.env` file when present). Nested values use `__` as separator:
//!
//! - `VLLM__BASE_URL=http://gpu-box:8000/v1` -> `vllm.base_url`
//! - `EXA__API_KEY=...` -> `exa.api_key`
//! - `DEBUG__ENABLED=true` -> `debug.enabled`
//!
//! The legacy flat names `VLLM_BASE_URL`, `DEFAULT_MODEL` and `EXA_API_KEY`
//! are still accepted and take precedence over their nested counterparts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value shipped in `.env.example`; treated the same as a missing key
pub const PLACEHOLDER_API_KEY: &str = "your_exa_api_key_here";

/// Top-level sections recognised in `SECTION__FIELD` variables
const SECTIONS: &[&str] = &["VLLM", "EXA", "AGENT", "LOGGING", "DEBUG"];

/// Flat variable names from older deployments
const LEGACY_KEYS: &[&str] = &["VLLM_BASE_URL", "DEFAULT_MODEL", "EXA_API_KEY"];

const VALID_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid timeout for {0}: must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("Invalid exa.max_results {0}: must be between 1 and 10")]
    InvalidMaxResults(u32),

    #[error("Invalid log level: {0}. Must be one of DEBUG, INFO, WARNING, ERROR, CRITICAL")]
    InvalidLogLevel(String),

    #[error("debug.keep_sessions must be at least 1")]
    InvalidKeepSessions,
}

/// Inference endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VllmConfig {
    /// Base URL of the OpenAI-compatible server
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Request timeout in seconds
    #[serde(alias = "timeout")]
    pub timeout_secs: u64,

    /// Retries on connection failures and 5xx answers
    pub max_retries: u32,

    /// Whether to wait for the server to come up before the first request
    pub wait_for_server: bool,
}

impl Default for VllmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".into(),
            model: "gpt-oss-120b".into(),
            timeout_secs: 30,
            max_retries: 3,
            wait_for_server: true,
        }
    }
}

impl VllmConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Exa search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExaConfig {
    /// API key; web search is unavailable without one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Feature flag for the web search tools
    pub enabled: bool,

    /// Request timeout in seconds
    #[serde(alias = "timeout")]
    pub timeout_secs: u64,

    /// Default number of results per search (1-10)
    pub max_results: u32,

    /// API root, overridable for tests and proxies
    pub base_url: String,
}

impl Default for ExaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            enabled: true,
            timeout_secs: 30,
            max_results: 5,
            base_url: "https://api.exa.ai".into(),
        }
    }
}

impl ExaConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// A key is usable when it is non-empty and not the placeholder
    pub fn has_usable_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(str::trim)
            .is_some_and(|k| !k.is_empty() && k != PLACEHOLDER_API_KEY)
    }

    /// Web search can run: flag on and a real key configured
    pub fn is_available(&self) -> bool {
        self.enabled && self.has_usable_key()
    }
}

/// Agent behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Display name of the assistant
    pub name: String,

    /// Custom instructions (replace the defaults when set)
    pub instructions: Option<String>,

    /// Whether tools are offered to the model at all
    pub enable_tools: bool,

    /// Upper bound on model turns inside one run (tool-call loop)
    pub max_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "GPT-OSS Assistant".into(),
            instructions: None,
            enable_tools: true,
            max_turns: 10,
        }
    }
}

/// Console / file logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of DEBUG, INFO, WARNING, ERROR, CRITICAL
    pub level: String,

    /// Optional log file, in addition to stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".into(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Map the configured level onto a `tracing` filter directive
    pub fn tracing_directive(&self) -> &'static str {
        level_directive(&self.level)
    }
}

/// Map a level name onto a `tracing` filter directive
pub fn level_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Debug file logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Dump every exchange to JSON files
    pub enabled: bool,

    /// Directory for the dump files
    pub log_dir: PathBuf,

    /// Number of most recent sessions kept on disk
    pub keep_sessions: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: PathBuf::from("logs/debug"),
            keep_sessions: 10,
        }
    }
}

/// Root application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub vllm: VllmConfig,
    pub exa: ExaConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
    pub debug: DebugConfig,

    #[serde(skip_serializing)]
    vllm_base_url: Option<String>,
    #[serde(skip_serializing)]
    default_model: Option<String>,
    #[serde(skip_serializing)]
    exa_api_key: Option<String>,
}

impl Settings {
    /// Load settings from the process environment and `.env`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed or fail validation.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        Self::load_from(std::env::vars())
    }

    /// Load settings from an explicit set of variables
    ///
    /// Only `SECTION__FIELD` variables for known sections and the legacy flat
    /// names are considered; everything else in the map is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed or fail validation.
    pub fn load_from<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| is_settings_key(k))
            .collect();

        let mut settings: Settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .source(Some(source)),
            )
            .build()?
            .try_deserialize()?;

        settings.fold_legacy();
        settings.normalize();
        settings.validate()?;

        Ok(settings)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid value found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.vllm.base_url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("vllm.base_url"));
        }
        if self.vllm.model.trim().is_empty() {
            return Err(ValidationError::MissingRequired("vllm.model"));
        }
        if self.vllm.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("vllm"));
        }
        if self.exa.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("exa"));
        }
        if !(1..=10).contains(&self.exa.max_results) {
            return Err(ValidationError::InvalidMaxResults(self.exa.max_results));
        }
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ValidationError::InvalidLogLevel(self.logging.level.clone()));
        }
        if self.debug.keep_sessions == 0 {
            return Err(ValidationError::InvalidKeepSessions);
        }
        Ok(())
    }

    /// Whether the web search tools can currently run
    pub fn web_search_enabled(&self) -> bool {
        self.exa.is_available()
    }

    /// Legacy flat variables override the nested ones
    fn fold_legacy(&mut self) {
        if let Some(url) = self.vllm_base_url.take() {
            self.vllm.base_url = url;
        }
        if let Some(model) = self.default_model.take() {
            self.vllm.model = model;
        }
        if let Some(key) = self.exa_api_key.take() {
            self.exa.api_key = Some(key);
        }
    }

    fn normalize(&mut self) {
        self.logging.level = self.logging.level.trim().to_ascii_uppercase();

        // Availability stays derived; a missing key only downgrades at query time
        if self.exa.enabled && !self.exa.has_usable_key() {
            tracing::debug!("Web search unavailable until an Exa API key is configured");
        }
    }
}

fn is_settings_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    if LEGACY_KEYS.contains(&upper.as_str()) {
        return true;
    }
    SECTIONS.iter().any(|section| {
        upper
            .strip_prefix(section)
            .is_some_and(|rest| rest.starts_with("__") && rest.len() > 2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        Settings::load_from(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_default_settings() {
        let settings = load(&[]).unwrap();

        assert_eq!(settings.vllm.base_url, "http://localhost:8000/v1");
        assert_eq!(settings.vllm.model, "gpt-oss-120b");
        assert_eq!(settings.vllm.timeout(), Duration::from_secs(30));
        assert_eq!(settings.logging.level, "INFO");
        assert!(!settings.debug.enabled);
        assert_eq!(settings.agent.max_turns, 10);
    }

    #[test]
    fn test_nested_variables() {
        let settings = load(&[
            ("VLLM__BASE_URL", "http://gpu-box:8000/v1"),
            ("VLLM__MODEL", "test-model"),
            ("VLLM__TIMEOUT", "45"),
            ("EXA__API_KEY", "test-key"),
            ("DEBUG__ENABLED", "true"),
            ("LOGGING__LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(settings.vllm.base_url, "http://gpu-box:8000/v1");
        assert_eq!(settings.vllm.model, "test-model");
        assert_eq!(settings.vllm.timeout_secs, 45);
        assert_eq!(settings.exa.api_key.as_deref(), Some("test-key"));
        assert!(settings.exa.enabled);
        assert!(settings.debug.enabled);
        assert_eq!(settings.logging.level, "DEBUG");
    }

    #[test]
    fn test_legacy_variables_win() {
        let settings = load(&[
            ("VLLM__MODEL", "nested-model"),
            ("DEFAULT_MODEL", "gpt-oss-20b"),
            ("VLLM_BASE_URL", "http://legacy:8000/v1"),
            ("EXA_API_KEY", "legacy-key"),
        ])
        .unwrap();

        assert_eq!(settings.vllm.model, "gpt-oss-20b");
        assert_eq!(settings.vllm.base_url, "http://legacy:8000/v1");
        assert_eq!(settings.exa.api_key.as_deref(), Some("legacy-key"));
        assert!(settings.web_search_enabled());
    }

    #[test]
    fn test_search_downgrades_without_key() {
        let settings = load(&[("EXA__ENABLED", "true")]).unwrap();
        assert!(settings.exa.enabled);
        assert!(!settings.web_search_enabled());

        let mut updated = settings.clone();
        updated.exa.api_key = Some("real-key".into());
        assert!(updated.web_search_enabled());

        let settings = load(&[("EXA__API_KEY", "")]).unwrap();
        assert!(!settings.web_search_enabled());
    }

    #[test]
    fn test_placeholder_key_is_unavailable() {
        let settings = load(&[("EXA__API_KEY", PLACEHOLDER_API_KEY)]).unwrap();
        assert!(!settings.exa.has_usable_key());
        assert!(!settings.web_search_enabled());
    }

    #[test]
    fn test_flag_off_disables_search() {
        let settings = load(&[("EXA__API_KEY", "real"), ("EXA__ENABLED", "false")]).unwrap();
        assert!(settings.exa.has_usable_key());
        assert!(!settings.web_search_enabled());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            load(&[("LOGGING__LEVEL", "verbose")]),
            Err(ConfigError::Validation(ValidationError::InvalidLogLevel(_)))
        ));
        assert!(matches!(
            load(&[("EXA__MAX_RESULTS", "11")]),
            Err(ConfigError::Validation(ValidationError::InvalidMaxResults(11)))
        ));
        assert!(matches!(
            load(&[("VLLM__TIMEOUT", "0")]),
            Err(ConfigError::Validation(ValidationError::InvalidTimeout("vllm")))
        ));
    }

    #[test]
    fn test_unrelated_variables_ignored() {
        let settings = load(&[("DEBUG", "1"), ("PATH", "/usr/bin"), ("AGENTS", "x")]).unwrap();
        assert!(!settings.debug.enabled);
    }

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("INFO"), "info");
    }
}

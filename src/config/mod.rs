//! Service configuration.
//!
//! Typed configuration loaded once at startup from a JSON5 file, with serde
//! defaults for every tunable and validation before the engine is built.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::autoreply::rules::{ReplyRuleConfig, RuleError, RuleSet};

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] json5::Error),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Connector binding this service to one WhatsApp account
    pub connector_id: String,
    pub platform: PlatformConfig,
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub autoreply: AutoReplyConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Platform API used for sending replies and inference calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,
    pub api_key: String,
}

fn default_platform_base_url() -> String {
    "https://testing.api.wexa.ai".to_string()
}

/// Account-level chat API credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub api_key: String,
    pub subdomain: String,
    pub port: u16,
    pub account_id: String,
}

/// Auto-reply engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_message_lookback")]
    pub message_lookback: usize,
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Overrides the built-in rule table; file order is precedence order
    #[serde(default)]
    pub rules: Option<Vec<ReplyRuleConfig>>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    crate::poller::DEFAULT_POLL_INTERVAL_SECS
}

fn default_message_lookback() -> usize {
    crate::autoreply::DEFAULT_MESSAGE_LOOKBACK
}

fn default_ledger_capacity() -> usize {
    crate::autoreply::DedupLedger::DEFAULT_CAPACITY
}

fn default_send_timeout_secs() -> u64 {
    10
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            message_lookback: default_message_lookback(),
            ledger_capacity: default_ledger_capacity(),
            send_timeout_secs: default_send_timeout_secs(),
            rules: None,
        }
    }
}

/// Optional LLM reply generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on one inference call; expiry falls back to the rule table
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}

fn default_llm_timeout_secs() -> u64 {
    10
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Log filtering and output format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ServiceConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate fields and compile the rule table
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connector_id.is_empty() {
            return Err(ConfigError::Invalid("connector_id must be set".to_string()));
        }
        if self.platform.api_key.is_empty() {
            return Err(ConfigError::Invalid(
                "platform.api_key must be set".to_string(),
            ));
        }
        if self.autoreply.enabled {
            for (field, value) in [
                ("messaging.api_key", &self.messaging.api_key),
                ("messaging.subdomain", &self.messaging.subdomain),
                ("messaging.account_id", &self.messaging.account_id),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::Invalid(format!("{} must be set", field)));
                }
            }
            if self.autoreply.poll_interval_secs == 0 {
                return Err(ConfigError::Invalid(
                    "autoreply.poll_interval_secs must be greater than 0".to_string(),
                ));
            }
            if self.autoreply.message_lookback == 0 {
                return Err(ConfigError::Invalid(
                    "autoreply.message_lookback must be greater than 0".to_string(),
                ));
            }
            if self.autoreply.ledger_capacity == 0 {
                return Err(ConfigError::Invalid(
                    "autoreply.ledger_capacity must be greater than 0".to_string(),
                ));
            }
        }
        // Rules must compile even when auto-reply starts disabled.
        self.rule_set()?;
        Ok(())
    }

    /// The configured rule table, or the built-in one
    pub fn rule_set(&self) -> Result<RuleSet, RuleError> {
        match &self.autoreply.rules {
            Some(rules) => RuleSet::compile(rules),
            None => Ok(RuleSet::builtin()),
        }
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replygate")
        .join("config.json5")
}

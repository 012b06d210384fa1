use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::debug;

use crate::llm::{ProviderKind, RetryConfig};

/// Project-level configuration file name
pub const PROJECT_CONFIG_FILE: &str = "agents-council.toml";

/// Application settings.
///
/// Loaded with precedence: project file > global file > defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database path (defaults to ~/.agents-council/council.db)
    pub database_path: Option<PathBuf>,

    pub providers: ProviderSettings,

    pub debate: DebateSettings,

    pub retry: RetrySettings,
}

impl Settings {
    /// Load settings from `./agents-council.toml`, falling back to
    /// `~/.agents-council/config.toml`, then to defaults.
    pub fn load() -> Result<Self> {
        let project = PathBuf::from(PROJECT_CONFIG_FILE);
        if project.exists() {
            return Self::load_from(&project);
        }

        if let Some(global) = global_config_path() {
            if global.exists() {
                return Self::load_from(&global);
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load settings from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        settings.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }

    /// Database path, resolving the default location when unset.
    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database_path {
            Some(ref path) => Ok(path.clone()),
            None => {
                let home = std::env::var("HOME").context("HOME environment variable not set")?;
                Ok(PathBuf::from(home)
                    .join(".agents-council")
                    .join("council.db"))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.debate.default_max_rounds == 0 {
            anyhow::bail!("debate.default_max_rounds must be at least 1");
        }
        let threshold = self.debate.default_consensus_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            anyhow::bail!(
                "debate.default_consensus_threshold must be in (0, 1], got {}",
                threshold
            );
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

fn global_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join(".agents-council")
            .join("config.toml"),
    )
}

/// Provider credentials and endpoints.
///
/// Keys left unset are read from the provider's environment variable on each call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ollama_api_key: Option<String>,
    pub ollama_base_url: String,
}

impl ProviderSettings {
    /// Explicitly configured key for a backend.
    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        let key = match kind {
            ProviderKind::OpenAI => &self.openai_api_key,
            ProviderKind::Anthropic => &self.anthropic_api_key,
            ProviderKind::Gemini => &self.gemini_api_key,
            ProviderKind::Ollama => &self.ollama_api_key,
        };
        key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            ollama_api_key: None,
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

/// Debate defaults and per-call generation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    pub default_max_rounds: u32,
    pub default_consensus_threshold: f64,
    /// Wall-clock bound on a single agent generation call (seconds)
    pub response_timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Abort a debate after this many rounds in a row where every agent failed
    pub max_consecutive_failed_rounds: u32,
}

impl DebateSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            default_max_rounds: 5,
            default_consensus_threshold: 0.8,
            response_timeout_secs: 90,
            temperature: 0.7,
            max_tokens: 1024,
            max_consecutive_failed_rounds: 2,
        }
    }
}

/// Backoff policy for transient provider errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Duration;
use tracing::debug;

use crate::agents::AgentResponder;
use crate::council::AgentsCouncil;
use crate::config::Settings;
use crate::debate::{DebateEngine, RoundOrchestrator, Summarizer};
use crate::error::CouncilError;
use crate::llm::{LlmProvider, ProviderRegistry, RetryConfig};
use crate::storage::{DebateStore, MemoryStorage, SqliteStorage};

/// Builder for constructing an [`AgentsCouncil`] instance.
///
/// Without an explicit registry, providers are built from the settings'
/// credentials. Without explicit storage, debates live in memory.
///
/// # Example
///
/// ```no_run
/// # use agents_council::AgentsCouncil;
/// # async fn example() -> Result<(), agents_council::CouncilError> {
/// let council = AgentsCouncil::builder()
///     .from_config()?
///     .sqlite_storage(None)?
///     .build()?;
///
/// println!("{:?}", council.available_providers());
/// # Ok(())
/// # }
/// ```
pub struct AgentsCouncilBuilder {
    settings: Settings,
    registry: Option<Arc<ProviderRegistry>>,
    store: Option<Arc<dyn DebateStore>>,
    retry: Option<RetryConfig>,
    response_timeout: Option<Duration>,
}

impl AgentsCouncilBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            registry: None,
            store: None,
            retry: None,
            response_timeout: None,
        }
    }

    /// Use explicit settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Load settings from `./agents-council.toml` or `~/.agents-council/config.toml`.
    pub fn from_config(self) -> Result<Self, CouncilError> {
        let settings = Settings::load().map_err(|e| CouncilError::Config(format!("{:#}", e)))?;
        Ok(self.settings(settings))
    }

    /// Replace the provider registry.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Register a provider under `id`, starting from an empty registry when
    /// none was set.
    pub fn provider(mut self, id: impl Into<String>, provider: impl LlmProvider + 'static) -> Self {
        self.registry
            .get_or_insert_with(|| Arc::new(ProviderRegistry::new()))
            .register(id, provider);
        self
    }

    /// Set a custom storage backend.
    pub fn storage(mut self, store: impl DebateStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Share an existing storage backend.
    pub fn shared_storage(mut self, store: Arc<dyn DebateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Keep councils and debates in memory only.
    pub fn memory_storage(self) -> Self {
        self.storage(MemoryStorage::new())
    }

    /// Use SQLite storage at `path`, or at the configured database path.
    pub fn sqlite_storage(self, path: Option<PathBuf>) -> Result<Self, CouncilError> {
        let path = match path {
            Some(p) => p,
            None => self
                .settings
                .database_path()
                .map_err(|e| CouncilError::Config(e.to_string()))?,
        };
        let store = SqliteStorage::new(&path)
            .map_err(|e| CouncilError::storage("failed to open database", format!("{:#}", e)))?;
        Ok(self.storage(store))
    }

    /// Override the retry policy from the settings.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Bound on a single agent generation call.
    pub fn response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = Some(response_timeout);
        self
    }

    /// End a debate in `error` after this many rounds where every agent failed.
    /// 0 disables the check.
    pub fn max_consecutive_failed_rounds(mut self, rounds: u32) -> Self {
        self.settings.debate.max_consecutive_failed_rounds = rounds;
        self
    }

    /// Build the configured instance.
    pub fn build(self) -> Result<AgentsCouncil, CouncilError> {
        let retry = self
            .retry
            .unwrap_or_else(|| self.settings.retry.to_retry_config());
        if retry.max_attempts == 0 {
            return Err(CouncilError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(ProviderRegistry::from_settings(&self.settings.providers)),
        };
        let store = match self.store {
            Some(store) => store,
            None => {
                debug!("no storage configured, using in-memory storage");
                Arc::new(MemoryStorage::new())
            }
        };

        let debate_settings = &self.settings.debate;
        let response_timeout = self
            .response_timeout
            .unwrap_or_else(|| debate_settings.response_timeout());
        let responder = AgentResponder::from_settings(
            Arc::clone(&registry),
            debate_settings,
            retry.clone(),
        )
        .with_response_timeout(response_timeout);
        let engine = DebateEngine::new(
            RoundOrchestrator::new(Arc::new(responder)),
            Summarizer::new(Arc::clone(&registry), retry, response_timeout),
            Arc::clone(&store),
            debate_settings.max_consecutive_failed_rounds,
        );

        debug!(
            providers = ?registry.names(),
            max_consecutive_failed_rounds = debate_settings.max_consecutive_failed_rounds,
            "building agents council"
        );

        Ok(AgentsCouncil::from_parts(
            registry,
            store,
            engine,
            self.settings,
        ))
    }
}

impl Default for AgentsCouncilBuilder {
    fn default() -> Self {
        Self::new()
    }
}

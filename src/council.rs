use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::builder::AgentsCouncilBuilder;
use crate::config::Settings;
use crate::debate::{CancelToken, DebateEngine};
use crate::debate_handle::DebateHandle;
use crate::error::CouncilError;
use crate::event::EventSender;
use crate::llm::ProviderRegistry;
use crate::model::{Council, Debate, DebateFilter, DebateStatus, DebateSummary, HistoryEntry};
use crate::storage::{DebateStore, StatusUpdate};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Message recorded on debates found without a live driver at startup
pub const INTERRUPTED_MESSAGE: &str = "Interrupted by restart";

/// Shared inner state, wrapped in Arc so spawned tasks can reference it.
struct Inner {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn DebateStore>,
    engine: DebateEngine,
    settings: Settings,
    /// Cancel tokens of debates driven by this instance
    running: Mutex<HashMap<String, CancelToken>>,
}

impl Inner {
    fn running(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancelToken>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a debate from the running set when its task ends, however it ends.
struct RunningGuard {
    inner: Arc<Inner>,
    debate_id: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.inner.running().remove(&self.debate_id);
    }
}

/// What a cancellation request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The debate is running; it stops after the round in flight seals
    Requested,
    /// No driver in this instance; the debate was marked cancelled in the
    /// store, where a driver in another process sees it before its next round
    Cancelled,
    /// The debate had already finished; nothing changed
    AlreadyFinished(DebateStatus),
}

/// Primary entry point for the agents-council library.
///
/// Use [`AgentsCouncil::builder()`] to construct an instance.
///
/// # Example
///
/// ```no_run
/// # use agents_council::{AgentConfig, AgentsCouncil, Council, Role};
/// # async fn example() -> Result<(), agents_council::CouncilError> {
/// let app = AgentsCouncil::builder().from_config()?.build()?;
///
/// let council = Council::new(
///     "strategy",
///     vec![
///         AgentConfig::new("Ada", "openai", Role::TechStrategist),
///         AgentConfig::new("Grace", "anthropic", Role::DevilsAdvocate),
///     ],
/// );
/// app.save_council(&council).await?;
///
/// let mut handle = app.create_debate(&council.id, "Should we rewrite it in Rust?").await?;
/// while let Some(update) = handle.next_event().await {
///     println!("{}", update.event_type());
/// }
/// let debate = handle.wait().await?;
/// println!("{}", debate.status);
/// # Ok(())
/// # }
/// ```
pub struct AgentsCouncil {
    inner: Arc<Inner>,
}

impl AgentsCouncil {
    pub(crate) fn from_parts(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn DebateStore>,
        engine: DebateEngine,
        settings: Settings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                engine,
                settings,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a new builder for configuring an `AgentsCouncil` instance.
    pub fn builder() -> AgentsCouncilBuilder {
        AgentsCouncilBuilder::new()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    /// Provider ids whose adapters currently report themselves available.
    pub fn available_providers(&self) -> BTreeSet<String> {
        self.inner.registry.list_available()
    }

    // Councils

    /// Validate and store a council, replacing any with the same id.
    pub async fn save_council(&self, council: &Council) -> Result<(), CouncilError> {
        council.validate()?;
        self.inner
            .store
            .save_council(council)
            .await
            .map_err(|e| CouncilError::storage("failed to save council", e))?;
        info!(
            council_id = %council.id,
            name = %council.name,
            agents = council.agents.len(),
            "saved council"
        );
        Ok(())
    }

    /// Parse a council from TOML, fill unset policy fields from the settings
    /// and store it.
    pub async fn import_council(&self, text: &str) -> Result<Council, CouncilError> {
        let mut table: toml::Table = toml::from_str(text)
            .map_err(|e| CouncilError::Validation(format!("invalid council file: {}", e)))?;

        let defaults = &self.inner.settings.debate;
        if !table.contains_key("max_rounds") {
            table.insert(
                "max_rounds".to_string(),
                toml::Value::Integer(i64::from(defaults.default_max_rounds)),
            );
        }
        if !table.contains_key("consensus_threshold") {
            table.insert(
                "consensus_threshold".to_string(),
                toml::Value::Float(defaults.default_consensus_threshold),
            );
        }

        let council: Council = toml::Value::Table(table)
            .try_into()
            .map_err(|e| CouncilError::Validation(format!("invalid council file: {}", e)))?;
        self.save_council(&council).await?;
        Ok(council)
    }

    pub async fn council(&self, id: &str) -> Result<Council, CouncilError> {
        self.inner
            .store
            .load_council(id)
            .await
            .map_err(|e| CouncilError::storage("failed to load council", e))?
            .ok_or_else(|| CouncilError::NotFound {
                kind: "council",
                id: id.to_string(),
            })
    }

    pub async fn councils(&self) -> Result<Vec<Council>, CouncilError> {
        self.inner
            .store
            .list_councils()
            .await
            .map_err(|e| CouncilError::storage("failed to list councils", e))
    }

    /// Delete a council. Debates already run against it are kept.
    pub async fn delete_council(&self, id: &str) -> Result<(), CouncilError> {
        let existed = self
            .inner
            .store
            .delete_council(id)
            .await
            .map_err(|e| CouncilError::storage("failed to delete council", e))?;
        if !existed {
            return Err(CouncilError::NotFound {
                kind: "council",
                id: id.to_string(),
            });
        }
        info!(council_id = id, "deleted council");
        Ok(())
    }

    // Debates

    /// Create a debate on `topic` and start running it.
    ///
    /// The debate runs in a background tokio task against a snapshot of the
    /// council. Use the returned [`DebateHandle`] to receive events and await
    /// the finished debate.
    pub async fn create_debate(
        &self,
        council_id: &str,
        topic: &str,
    ) -> Result<DebateHandle, CouncilError> {
        let council = self.council(council_id).await?;
        let debate = Debate::new(&council.id, topic)?;

        self.inner
            .store
            .save_debate(&debate)
            .await
            .map_err(|e| CouncilError::storage("failed to save debate", e))?;
        if let Err(e) = self
            .inner
            .store
            .append_history(&HistoryEntry::new(&debate, "debate created"))
            .await
        {
            warn!(debate_id = %debate.id, error = %e, "failed to append history");
        }

        info!(
            debate_id = %debate.id,
            council = %council.name,
            topic = %debate.topic,
            "starting debate"
        );

        let debate_id = debate.id.clone();
        let cancel = CancelToken::new();
        self.inner
            .running()
            .insert(debate_id.clone(), cancel.clone());

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let events = EventSender::new(tx, &debate_id);
        let guard = RunningGuard {
            inner: Arc::clone(&self.inner),
            debate_id: debate_id.clone(),
        };
        let token = cancel.clone();

        let completion = tokio::spawn(async move {
            let debate = guard
                .inner
                .engine
                .run(&council, debate, &token, &events)
                .await;
            drop(guard);
            // EventSender is dropped here, closing the channel
            debate
        });

        Ok(DebateHandle::new(debate_id, rx, completion, cancel))
    }

    /// Request cancellation of a debate.
    ///
    /// A running debate stops after its in-flight round seals. A stored debate
    /// without a driver is cancelled directly. Cancelling a finished debate is a
    /// no-op.
    pub async fn cancel(&self, debate_id: &str) -> Result<CancelOutcome, CouncilError> {
        let token = self.inner.running().get(debate_id).cloned();
        if let Some(token) = token {
            token.cancel();
            info!(debate_id, "cancellation requested");
            return Ok(CancelOutcome::Requested);
        }

        let mut debate = self.debate(debate_id).await?;
        if debate.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished(debate.status));
        }

        debate.finish(DebateStatus::Cancelled, None);
        if !self.persist_finished(&debate, "debate ended: cancelled").await? {
            let stored = self.debate(debate_id).await?;
            return Ok(CancelOutcome::AlreadyFinished(stored.status));
        }
        info!(debate_id, "cancelled debate in the store");
        Ok(CancelOutcome::Cancelled)
    }

    /// Whether this instance is currently driving the debate.
    pub fn is_running(&self, debate_id: &str) -> bool {
        self.inner.running().contains_key(debate_id)
    }

    pub async fn debate(&self, id: &str) -> Result<Debate, CouncilError> {
        self.inner
            .store
            .load_debate(id)
            .await
            .map_err(|e| CouncilError::storage("failed to load debate", e))?
            .ok_or_else(|| CouncilError::NotFound {
                kind: "debate",
                id: id.to_string(),
            })
    }

    /// List debates matching `filter`, newest first.
    pub async fn debates(&self, filter: &DebateFilter) -> Result<Vec<DebateSummary>, CouncilError> {
        self.inner
            .store
            .list_debates(filter)
            .await
            .map_err(|e| CouncilError::storage("failed to list debates", e))
    }

    /// Delete a finished or abandoned debate with its rounds and history.
    pub async fn delete_debate(&self, id: &str) -> Result<(), CouncilError> {
        if self.is_running(id) {
            return Err(CouncilError::Validation(format!(
                "debate {} is running; cancel it first",
                id
            )));
        }
        let existed = self
            .inner
            .store
            .delete_debate(id)
            .await
            .map_err(|e| CouncilError::storage("failed to delete debate", e))?;
        if !existed {
            return Err(CouncilError::NotFound {
                kind: "debate",
                id: id.to_string(),
            });
        }
        info!(debate_id = id, "deleted debate");
        Ok(())
    }

    /// Lifecycle log of a debate, oldest first.
    pub async fn history(&self, debate_id: &str) -> Result<Vec<HistoryEntry>, CouncilError> {
        self.inner
            .store
            .history(debate_id)
            .await
            .map_err(|e| CouncilError::storage("failed to load history", e))
    }

    /// Mark debates left `pending` or `in_progress` by a previous process as
    /// `error`. Returns the ids that were recovered.
    ///
    /// Only debates driven by this instance are skipped, so run it when no
    /// other process is driving debates against the same store. A driver that
    /// is still alive elsewhere stops before its next round.
    pub async fn recover_interrupted(&self) -> Result<Vec<String>, CouncilError> {
        let mut recovered = Vec::new();

        for status in [DebateStatus::Pending, DebateStatus::InProgress] {
            let filter = DebateFilter::default().with_status(status);
            for summary in self.debates(&filter).await? {
                if self.is_running(&summary.id) {
                    continue;
                }
                let mut debate = self.debate(&summary.id).await?;
                if !debate.finish(DebateStatus::Error, Some(INTERRUPTED_MESSAGE.to_string())) {
                    continue;
                }
                let written = self
                    .persist_finished(
                        &debate,
                        &format!("debate ended: error ({})", INTERRUPTED_MESSAGE),
                    )
                    .await?;
                if !written {
                    continue;
                }
                warn!(
                    debate_id = %debate.id,
                    round = debate.current_round,
                    "recovered interrupted debate"
                );
                recovered.push(debate.id);
            }
        }

        Ok(recovered)
    }

    /// Store a terminal status written outside the engine. Returns `false`
    /// when the stored debate had already finished.
    async fn persist_finished(&self, debate: &Debate, message: &str) -> Result<bool, CouncilError> {
        let written = self
            .inner
            .store
            .update_debate_status(&debate.id, &StatusUpdate::from_debate(debate))
            .await
            .map_err(|e| CouncilError::storage("failed to update debate status", e))?;
        if !written {
            return Ok(false);
        }
        if let Err(e) = self
            .inner
            .store
            .append_history(&HistoryEntry::new(debate, message))
            .await
        {
            warn!(debate_id = %debate.id, error = %e, "failed to append history");
        }
        Ok(true)
    }
}

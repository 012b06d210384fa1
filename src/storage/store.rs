use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    Council, Debate, DebateFilter, DebateStatus, DebateSummary, HistoryEntry, Round,
};

/// Debate-level fields written on every status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: DebateStatus,
    pub current_round: u32,
    pub summary: Option<String>,
    pub pro_points: Option<Vec<String>>,
    pub against_points: Option<Vec<String>>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Snapshot of a debate's non-round fields.
    pub fn from_debate(debate: &Debate) -> Self {
        Self {
            status: debate.status,
            current_round: debate.current_round,
            summary: debate.summary.clone(),
            pro_points: debate.pro_points.clone(),
            against_points: debate.against_points.clone(),
            error_message: debate.error_message.clone(),
            completed_at: debate.completed_at,
        }
    }

    pub(crate) fn apply(&self, debate: &mut Debate) {
        debate.status = self.status;
        debate.current_round = self.current_round;
        debate.summary = self.summary.clone();
        debate.pro_points = self.pro_points.clone();
        debate.against_points = self.against_points.clone();
        debate.error_message = self.error_message.clone();
        debate.completed_at = self.completed_at;
    }
}

/// Persistence backend for councils, debates and their history.
///
/// Several processes may share one store. A debate's terminal status is
/// final: once stored, status updates and new rounds for it are refused.
#[async_trait]
pub trait DebateStore: Send + Sync {
    /// Insert or replace a council
    async fn save_council(&self, council: &Council) -> Result<()>;

    /// Load a council by ID
    async fn load_council(&self, id: &str) -> Result<Option<Council>>;

    /// List all councils, newest first
    async fn list_councils(&self) -> Result<Vec<Council>>;

    /// Delete a council. Returns whether it existed.
    async fn delete_council(&self, id: &str) -> Result<bool>;

    /// Insert or replace a debate including its rounds
    async fn save_debate(&self, debate: &Debate) -> Result<()>;

    /// Load a debate with its rounds in round order
    async fn load_debate(&self, id: &str) -> Result<Option<Debate>>;

    /// List debates matching the filter, newest first
    async fn list_debates(&self, filter: &DebateFilter) -> Result<Vec<DebateSummary>>;

    /// Delete a debate with its rounds and history. Returns whether it existed.
    async fn delete_debate(&self, id: &str) -> Result<bool>;

    /// Persist a sealed round and advance the debate's round counter.
    ///
    /// Fails if the debate does not exist or has already finished.
    async fn save_round(&self, debate_id: &str, round: &Round) -> Result<()>;

    /// Write status and outcome fields.
    ///
    /// Returns `false` without writing when the stored debate has already
    /// finished. Fails if the debate does not exist.
    async fn update_debate_status(&self, debate_id: &str, update: &StatusUpdate) -> Result<bool>;

    /// Append a lifecycle entry
    async fn append_history(&self, entry: &HistoryEntry) -> Result<()>;

    /// Lifecycle entries for a debate, oldest first
    async fn history(&self, debate_id: &str) -> Result<Vec<HistoryEntry>>;
}

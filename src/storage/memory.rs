use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DebateStore, StatusUpdate};
use crate::model::{Council, Debate, DebateFilter, DebateSummary, HistoryEntry, Round};

#[derive(Default)]
struct State {
    councils: HashMap<String, Council>,
    debates: HashMap<String, Debate>,
    history: Vec<HistoryEntry>,
}

/// In-process store for tests and embedders that do not need durability.
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn summarize(debate: &Debate) -> DebateSummary {
    DebateSummary {
        id: debate.id.clone(),
        council_id: debate.council_id.clone(),
        topic: debate.topic.clone(),
        status: debate.status,
        current_round: debate.current_round,
        created_at: debate.created_at.to_rfc3339(),
    }
}

#[async_trait]
impl DebateStore for MemoryStorage {
    async fn save_council(&self, council: &Council) -> Result<()> {
        self.state
            .write()
            .await
            .councils
            .insert(council.id.clone(), council.clone());
        Ok(())
    }

    async fn load_council(&self, id: &str) -> Result<Option<Council>> {
        Ok(self.state.read().await.councils.get(id).cloned())
    }

    async fn list_councils(&self) -> Result<Vec<Council>> {
        let mut councils: Vec<Council> =
            self.state.read().await.councils.values().cloned().collect();
        councils.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(councils)
    }

    async fn delete_council(&self, id: &str) -> Result<bool> {
        Ok(self.state.write().await.councils.remove(id).is_some())
    }

    async fn save_debate(&self, debate: &Debate) -> Result<()> {
        self.state
            .write()
            .await
            .debates
            .insert(debate.id.clone(), debate.clone());
        Ok(())
    }

    async fn load_debate(&self, id: &str) -> Result<Option<Debate>> {
        Ok(self.state.read().await.debates.get(id).cloned())
    }

    async fn list_debates(&self, filter: &DebateFilter) -> Result<Vec<DebateSummary>> {
        let state = self.state.read().await;
        let mut debates: Vec<&Debate> = state
            .debates
            .values()
            .filter(|d| filter.matches(&d.council_id, d.status))
            .collect();
        debates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(debates.into_iter().map(summarize).collect())
    }

    async fn delete_debate(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.history.retain(|entry| entry.debate_id != id);
        Ok(state.debates.remove(id).is_some())
    }

    async fn save_round(&self, debate_id: &str, round: &Round) -> Result<()> {
        let mut state = self.state.write().await;
        let debate = state
            .debates
            .get_mut(debate_id)
            .ok_or_else(|| anyhow::anyhow!("debate not found: {}", debate_id))?;
        if debate.is_terminal() {
            anyhow::bail!("debate {} already finished ({})", debate_id, debate.status);
        }

        match debate
            .rounds
            .iter_mut()
            .find(|r| r.round_number == round.round_number)
        {
            Some(existing) => *existing = round.clone(),
            None => {
                debate.rounds.push(round.clone());
                debate.rounds.sort_by_key(|r| r.round_number);
            }
        }
        debate.current_round = debate.current_round.max(round.round_number);
        Ok(())
    }

    async fn update_debate_status(&self, debate_id: &str, update: &StatusUpdate) -> Result<bool> {
        let mut state = self.state.write().await;
        let debate = state
            .debates
            .get_mut(debate_id)
            .ok_or_else(|| anyhow::anyhow!("debate not found: {}", debate_id))?;
        if debate.is_terminal() {
            return Ok(false);
        }
        update.apply(debate);
        Ok(true)
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        self.state.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn history(&self, debate_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .state
            .read()
            .await
            .history
            .iter()
            .filter(|entry| entry.debate_id == debate_id)
            .cloned()
            .collect())
    }
}

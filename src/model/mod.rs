mod council;
mod debate;
mod vote;

pub use council::{AgentConfig, Council, DEFAULT_CONSENSUS_THRESHOLD, DEFAULT_MAX_ROUNDS};
pub use debate::{
    AgentResponse, Debate, DebateFilter, DebateStatus, DebateSummary, HistoryEntry, Round,
};
pub use vote::{Vote, VoteTally};

pub mod agents;
pub mod builder;
pub mod config;
mod council;
pub mod debate;
pub mod debate_handle;
pub mod error;
pub mod event;
pub mod llm;
pub mod model;
pub mod storage;

pub use agents::{AgentResponder, Role, RolePrompt, parse_reasoning, parse_vote};
pub use builder::AgentsCouncilBuilder;
pub use config::Settings;
pub use council::{AgentsCouncil, CancelOutcome, INTERRUPTED_MESSAGE};
pub use debate::{CancelToken, DebateEngine, ModeratorReport, RoundOrchestrator, Summarizer};
pub use debate_handle::DebateHandle;
pub use error::CouncilError;
pub use event::{DebateUpdate, Event, EventSender};
pub use llm::{
    BackendProvider, GenerateRequest, LlmProvider, ProviderError, ProviderErrorKind, ProviderKind,
    ProviderRegistry, RetryConfig,
};
pub use model::{
    AgentConfig, AgentResponse, Council, Debate, DebateFilter, DebateStatus, DebateSummary,
    HistoryEntry, Round, Vote, VoteTally,
};
pub use storage::{DebateStore, MemoryStorage, SqliteStorage, StatusUpdate};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::model::{AgentResponse, DebateStatus, Vote, VoteTally};

/// Events emitted while a debate runs.
///
/// Consumers receive these wrapped in a [`DebateUpdate`] through
/// [`DebateHandle::next_event()`](crate::DebateHandle::next_event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// The debate moved to `in_progress`
    DebateStart {
        topic: String,
        council_id: String,
        agent_count: usize,
        max_rounds: u32,
    },
    /// A round began
    RoundStart { round: u32 },
    /// An agent's generation call was issued
    AgentThinking {
        round: u32,
        agent_id: String,
        agent_name: String,
    },
    /// A text fragment arrived from a streaming provider
    AgentResponseChunk {
        round: u32,
        agent_id: String,
        agent_name: String,
        chunk: String,
    },
    /// An agent finished (possibly with an error-substitute response)
    AgentResponse {
        round: u32,
        response: AgentResponse,
    },
    /// An agent's counted vote for the round
    Vote {
        round: u32,
        agent_id: String,
        agent_name: String,
        vote: Vote,
    },
    /// The round was sealed
    RoundComplete {
        round: u32,
        tally: VoteTally,
        consensus: bool,
    },
    /// The debate reached a terminal status
    DebateComplete {
        status: DebateStatus,
        rounds: u32,
        summary: Option<String>,
        pro_points: Option<Vec<String>>,
        against_points: Option<Vec<String>>,
        error_message: Option<String>,
    },
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DebateStart { .. } => "debate_start",
            Self::RoundStart { .. } => "round_start",
            Self::AgentThinking { .. } => "agent_thinking",
            Self::AgentResponseChunk { .. } => "agent_response_chunk",
            Self::AgentResponse { .. } => "agent_response",
            Self::Vote { .. } => "vote",
            Self::RoundComplete { .. } => "round_complete",
            Self::DebateComplete { .. } => "debate_complete",
        }
    }
}

/// An event addressed to one debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateUpdate {
    pub debate_id: String,
    #[serde(flatten)]
    pub event: Event,
}

impl DebateUpdate {
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// The event's fields as a JSON object.
    pub fn payload(&self) -> Value {
        match serde_json::to_value(&self.event) {
            Ok(Value::Object(mut map)) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// Sender for debate events.
///
/// Wraps a `tokio::sync::mpsc::Sender<DebateUpdate>` bound to one debate id.
/// If constructed with `noop()`, all sends are silently dropped.
#[derive(Clone)]
pub struct EventSender {
    inner: Option<mpsc::Sender<DebateUpdate>>,
    debate_id: String,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<DebateUpdate>, debate_id: impl Into<String>) -> Self {
        Self {
            inner: Some(sender),
            debate_id: debate_id.into(),
        }
    }

    /// Create a no-op sender that silently drops all events.
    pub fn noop() -> Self {
        Self {
            inner: None,
            debate_id: String::new(),
        }
    }

    /// Emit a non-critical event (best-effort, drops on backpressure).
    pub fn emit(&self, event: Event) {
        if let Some(ref sender) = self.inner {
            let _ = sender.try_send(self.wrap(event));
        }
    }

    /// Emit a streamed text fragment.
    pub fn emit_chunk(&self, round: u32, agent_id: &str, agent_name: &str, chunk: String) {
        self.emit(Event::AgentResponseChunk {
            round,
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            chunk,
        });
    }

    /// Emit a critical event, waiting for capacity (blocks until consumer reads).
    ///
    /// Returns immediately once the consumer has gone away.
    pub async fn emit_blocking(&self, event: Event) {
        if let Some(ref sender) = self.inner {
            let _ = sender.send(self.wrap(event)).await;
        }
    }

    /// Returns true if this sender is connected (not noop) and the consumer is listening.
    pub fn is_active(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| !s.is_closed())
    }

    fn wrap(&self, event: Event) -> DebateUpdate {
        DebateUpdate {
            debate_id: self.debate_id.clone(),
            event,
        }
    }
}

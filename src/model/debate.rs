use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AgentConfig, Vote, VoteTally};
use crate::agents::Role;
use crate::error::CouncilError;

/// Lifecycle status of a debate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    /// Created, not started
    #[default]
    Pending,
    /// Rounds are being run
    InProgress,
    /// A round met the council's consensus threshold
    ConsensusReached,
    /// max_rounds rounds ran without consensus
    RoundLimitReached,
    /// Stopped on request
    Cancelled,
    /// Stopped by an unrecoverable fault
    Error,
}

impl DebateStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::InProgress)
    }

    /// Whether a moderator summary is produced on entering this status.
    pub fn wants_summary(self) -> bool {
        matches!(self, Self::ConsensusReached | Self::RoundLimitReached)
    }
}

impl fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::ConsensusReached => write!(f, "consensus_reached"),
            Self::RoundLimitReached => write!(f, "round_limit_reached"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for DebateStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "consensus_reached" | "consensus" => Ok(Self::ConsensusReached),
            "round_limit_reached" | "round_limit" => Ok(Self::RoundLimitReached),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            _ => anyhow::bail!(
                "invalid debate status '{}' (expected: pending, in_progress, consensus_reached, round_limit_reached, cancelled, error)",
                s
            ),
        }
    }
}

/// One agent's contribution to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub agent_name: String,
    pub role: Role,
    pub provider: String,

    /// Generated text, or an explanation of the failure for error substitutes
    pub content: String,

    /// Vote parsed from the text; `None` when no marker was found
    #[serde(default)]
    pub vote: Option<Vote>,

    #[serde(default)]
    pub reasoning: Option<String>,

    /// Set when generation failed and this response stands in for the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    pub fn new(agent: &AgentConfig, content: impl Into<String>) -> Self {
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            role: agent.role,
            provider: agent.provider.clone(),
            content: content.into(),
            vote: None,
            reasoning: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Stand-in response for an agent whose generation failed.
    pub fn error_substitute(agent: &AgentConfig, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            content: format!(
                "{} could not respond this round: {}",
                agent.name, error
            ),
            vote: Some(Vote::DEFAULT),
            error: Some(error),
            ..Self::new(agent, String::new())
        }
    }

    pub fn is_error_substitute(&self) -> bool {
        self.error.is_some()
    }

    /// The vote counted for this response.
    pub fn effective_vote(&self) -> Vote {
        self.vote.unwrap_or(Vote::DEFAULT)
    }
}

/// One synchronized cycle of every agent responding and voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// 1-based, strictly increasing within a debate
    pub round_number: u32,

    /// Responses in completion order
    pub responses: Vec<AgentResponse>,

    /// Agent id to counted vote
    pub votes: BTreeMap<String, Vote>,

    #[serde(default)]
    pub tally: Option<VoteTally>,

    pub consensus_reached: bool,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn new(round_number: u32) -> Self {
        Self {
            round_number,
            responses: Vec::new(),
            votes: BTreeMap::new(),
            tally: None,
            consensus_reached: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record a response and its counted vote.
    pub fn record(&mut self, response: AgentResponse) {
        self.votes
            .insert(response.agent_id.clone(), response.effective_vote());
        self.responses.push(response);
    }

    /// Compute the tally and consensus flag and stamp completion.
    pub fn seal(&mut self, consensus_threshold: f64) {
        let tally = VoteTally::from_votes(self.votes.values());
        self.consensus_reached = tally.reaches(consensus_threshold);
        self.tally = Some(tally);
        self.completed_at = Some(Utc::now());
    }

    pub fn is_sealed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Every agent failed to produce a real response.
    pub fn is_degraded(&self) -> bool {
        !self.responses.is_empty() && self.responses.iter().all(|r| r.is_error_substitute())
    }

    pub fn failed_agents(&self) -> usize {
        self.responses
            .iter()
            .filter(|r| r.is_error_substitute())
            .count()
    }
}

/// A debate among a council's agents on one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debate {
    pub id: String,
    pub council_id: String,
    pub topic: String,
    pub status: DebateStatus,

    #[serde(default)]
    pub rounds: Vec<Round>,

    /// Number of sealed rounds appended so far
    #[serde(default)]
    pub current_round: u32,

    /// Moderator's final summary (Markdown)
    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub pro_points: Option<Vec<String>>,

    #[serde(default)]
    pub against_points: Option<Vec<String>>,

    #[serde(default)]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Debate {
    /// Create a pending debate. Fails on an empty topic.
    pub fn new(
        council_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<Self, CouncilError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(CouncilError::Validation(
                "debate topic must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            council_id: council_id.into(),
            topic,
            status: DebateStatus::Pending,
            rounds: Vec::new(),
            current_round: 0,
            summary: None,
            pro_points: None,
            against_points: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append a sealed round, keeping round numbers contiguous from 1.
    pub fn push_round(&mut self, round: Round) -> Result<(), CouncilError> {
        if self.is_terminal() {
            return Err(CouncilError::Debate(format!(
                "debate {} is {} and accepts no further rounds",
                self.id, self.status
            )));
        }
        let expected = self.current_round + 1;
        if round.round_number != expected {
            return Err(CouncilError::Debate(format!(
                "round {} appended to debate {} out of sequence (expected {})",
                round.round_number, self.id, expected
            )));
        }
        if !round.is_sealed() {
            return Err(CouncilError::Debate(format!(
                "round {} of debate {} is not sealed",
                round.round_number, self.id
            )));
        }

        self.rounds.push(round);
        self.current_round = expected;
        Ok(())
    }

    /// Move to a terminal status. A debate already terminal is left untouched.
    ///
    /// Returns whether the status changed.
    pub fn finish(&mut self, status: DebateStatus, error_message: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        if error_message.is_some() {
            self.error_message = error_message;
        }
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }
}

/// Summary of a debate for listing (without rounds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebateSummary {
    pub id: String,
    pub council_id: String,
    pub topic: String,
    pub status: DebateStatus,
    pub current_round: u32,
    pub created_at: String,
}

impl fmt::Display for DebateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topic_preview: String = if self.topic.chars().count() > 50 {
            self.topic.chars().take(47).collect::<String>() + "..."
        } else {
            self.topic.clone()
        };

        let id_short: String = self.id.chars().take(8).collect();

        write!(
            f,
            "{:<10} {:<20} {:<6} {}",
            id_short, self.status, self.current_round, topic_preview
        )
    }
}

/// Criteria for listing debates. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebateFilter {
    pub council_id: Option<String>,
    pub status: Option<DebateStatus>,
}

impl DebateFilter {
    pub fn council(council_id: impl Into<String>) -> Self {
        Self {
            council_id: Some(council_id.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: DebateStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, council_id: &str, status: DebateStatus) -> bool {
        self.council_id.as_deref().is_none_or(|id| id == council_id)
            && self.status.is_none_or(|s| s == status)
    }
}

/// An entry in a debate's append-only lifecycle log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub debate_id: String,
    pub status: DebateStatus,
    pub round: u32,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(debate: &Debate, message: impl Into<String>) -> Self {
        Self {
            debate_id: debate.id.clone(),
            status: debate.status,
            round: debate.current_round,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }
}

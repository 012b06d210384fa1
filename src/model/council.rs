use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::Role;
use crate::error::CouncilError;

pub const DEFAULT_MAX_ROUNDS: u32 = 5;
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.8;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

fn default_consensus_threshold() -> f64 {
    DEFAULT_CONSENSUS_THRESHOLD
}

/// A named, ordered set of agents plus the round and consensus policy.
///
/// Debates take a snapshot of the council when they start, so later edits only
/// affect future debates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Council {
    #[serde(default = "new_id")]
    pub id: String,

    pub name: String,

    /// Participating agents, in configuration order
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Maximum rounds before the debate stops without consensus
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Fraction of non-abstaining votes that must agree, in (0, 1]
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Council {
    pub fn new(name: impl Into<String>, agents: Vec<AgentConfig>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            agents,
            max_rounds: DEFAULT_MAX_ROUNDS,
            consensus_threshold: DEFAULT_CONSENSUS_THRESHOLD,
            created_at: Utc::now(),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_consensus_threshold(mut self, threshold: f64) -> Self {
        self.consensus_threshold = threshold;
        self
    }

    /// Look up an agent by id.
    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Check the council can drive a debate.
    pub fn validate(&self) -> Result<(), CouncilError> {
        if self.name.trim().is_empty() {
            return Err(CouncilError::Validation(
                "council name must not be empty".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(CouncilError::Validation(format!(
                "council '{}' has no agents",
                self.name
            )));
        }
        if self.max_rounds < 1 {
            return Err(CouncilError::Validation(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        if !(self.consensus_threshold > 0.0 && self.consensus_threshold <= 1.0) {
            return Err(CouncilError::Validation(format!(
                "consensus_threshold must be in (0, 1], got {}",
                self.consensus_threshold
            )));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(CouncilError::Validation(format!(
                    "duplicate agent id '{}' in council '{}'",
                    agent.id, self.name
                )));
            }
            if agent.provider.trim().is_empty() {
                return Err(CouncilError::Validation(format!(
                    "agent '{}' has no provider",
                    agent.name
                )));
            }
        }

        Ok(())
    }
}

/// One configured persona taking part in a debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "new_id")]
    pub id: String,

    /// Display name
    pub name: String,

    /// Registry identifier of the provider backing this agent
    pub provider: String,

    pub role: Role,

    /// Replaces the role's system prompt entirely when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,

    /// Provider-specific model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, provider: impl Into<String>, role: Role) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            provider: provider.into(),
            role,
            custom_prompt: None,
            model: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents() -> Vec<AgentConfig> {
        vec![
            AgentConfig::new("Ada", "openai", Role::TechStrategist),
            AgentConfig::new("Lex", "anthropic", Role::LegalAdvisor),
        ]
    }

    #[test]
    fn test_valid_council() {
        let council = Council::new("Board", agents());
        assert!(council.validate().is_ok());
        assert_eq!(council.max_rounds, 5);
        assert_eq!(council.consensus_threshold, 0.8);
    }

    #[test]
    fn test_rejects_empty_council() {
        let council = Council::new("Empty", vec![]);
        assert!(matches!(council.validate(), Err(CouncilError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_threshold_and_rounds() {
        assert!(Council::new("B", agents()).with_consensus_threshold(0.0).validate().is_err());
        assert!(Council::new("B", agents()).with_consensus_threshold(1.01).validate().is_err());
        assert!(Council::new("B", agents()).with_consensus_threshold(1.0).validate().is_ok());
        assert!(Council::new("B", agents()).with_max_rounds(0).validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_agent_ids() {
        let council = Council::new(
            "Dupes",
            vec![
                AgentConfig::new("A", "openai", Role::PrExpert).with_id("same"),
                AgentConfig::new("B", "openai", Role::PrExpert).with_id("same"),
            ],
        );
        let err = council.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate agent id"));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let council: Council = toml::from_str(
            r#"
name = "Investment Council"

[[agents]]
name = "Advisor"
provider = "openai"
role = "investment_advisor"

[[agents]]
name = "Skeptic"
provider = "anthropic"
role = "devils_advocate"
model = "claude-3-5-haiku-20241022"
"#,
        )
        .unwrap();

        assert_eq!(council.agents.len(), 2);
        assert_eq!(council.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_ne!(council.agents[0].id, council.agents[1].id);
        assert_eq!(council.agents[1].model.as_deref(), Some("claude-3-5-haiku-20241022"));
        assert!(council.validate().is_ok());
    }
}

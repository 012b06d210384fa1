use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::AgentConfig;

/// Appended to every built-in persona so agents commit to a position.
const STANCE_DIRECTIVE: &str = "\n\nTake a clear position. Ground it in your area of expertise, \
engage directly with the points other council members have made, and change your mind only \
when an argument genuinely persuades you. Keep your response focused and under 300 words.";

const CUSTOM_FALLBACK_PROMPT: &str = "You are a helpful AI assistant.";

/// Persona an agent speaks as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    InvestmentAdvisor,
    PrExpert,
    PoliticsExpert,
    LegalAdvisor,
    TechStrategist,
    DevilsAdvocate,
    /// Neutral summarizer used after the debate ends
    Moderator,
    /// Persona defined entirely by the agent's custom prompt
    Custom,
}

impl Role {
    pub const BUILT_IN: [Role; 7] = [
        Self::InvestmentAdvisor,
        Self::PrExpert,
        Self::PoliticsExpert,
        Self::LegalAdvisor,
        Self::TechStrategist,
        Self::DevilsAdvocate,
        Self::Moderator,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::InvestmentAdvisor => "investment_advisor",
            Self::PrExpert => "pr_expert",
            Self::PoliticsExpert => "politics_expert",
            Self::LegalAdvisor => "legal_advisor",
            Self::TechStrategist => "tech_strategist",
            Self::DevilsAdvocate => "devils_advocate",
            Self::Moderator => "moderator",
            Self::Custom => "custom",
        }
    }

    /// The role's persona text, or `None` for [`Role::Custom`].
    pub fn prompt(self) -> Option<RolePrompt> {
        let (persona, voting_guidance) = match self {
            Self::InvestmentAdvisor => (
                "You are a seasoned investment advisor. You evaluate proposals through risk and \
                 return, capital allocation, market conditions, and long-term financial \
                 sustainability.",
                "Agree when the financial case is sound and the risks are proportionate.",
            ),
            Self::PrExpert => (
                "You are a public relations expert. You assess how decisions will be perceived by \
                 customers, media, employees, and the public, and how they affect reputation and \
                 trust.",
                "Agree when the reputational upside outweighs the exposure.",
            ),
            Self::PoliticsExpert => (
                "You are a political analyst. You consider regulatory climate, stakeholder \
                 interests, coalition dynamics, and the policy consequences of a decision.",
                "Agree when the proposal is viable given the political landscape.",
            ),
            Self::LegalAdvisor => (
                "You are a legal advisor. You identify legal risks, compliance obligations, \
                 liability, contractual issues, and precedent relevant to the question.",
                "Agree only when the legal exposure is understood and acceptable.",
            ),
            Self::TechStrategist => (
                "You are a technology strategist. You weigh technical feasibility, scalability, \
                 architecture trade-offs, innovation potential, and execution risk.",
                "Agree when the technical path is credible and worth the investment.",
            ),
            Self::DevilsAdvocate => (
                "You are the devil's advocate. You challenge assumptions, expose weak reasoning, \
                 and argue the strongest case against the prevailing view so the council does \
                 not settle too early.",
                "Agree only when the counterarguments have been answered convincingly.",
            ),
            Self::Moderator => (
                "You are a neutral debate moderator. You synthesize the discussion faithfully, \
                 represent every side fairly, and never add opinions of your own.",
                "Do not vote; summarize.",
            ),
            Self::Custom => return None,
        };

        let system_prompt = if self == Self::Moderator {
            persona.to_string()
        } else {
            format!("{}{}", persona, STANCE_DIRECTIVE)
        };

        Some(RolePrompt {
            system_prompt,
            voting_guidance,
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::BUILT_IN
            .into_iter()
            .chain([Self::Custom])
            .find(|role| role.id() == normalized)
            .ok_or_else(|| anyhow::anyhow!("unknown role '{}'", s))
    }
}

/// Persona text for a built-in role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePrompt {
    /// System prompt including the stance directive
    pub system_prompt: String,
    /// One line telling the agent what an AGREE vote means for this persona
    pub voting_guidance: &'static str,
}

/// System prompt for an agent.
///
/// A custom prompt replaces the role's persona entirely. A custom role with
/// no prompt falls back to a generic assistant persona.
pub fn system_prompt_for(agent: &AgentConfig) -> String {
    if let Some(prompt) = agent
        .custom_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        return prompt.to_string();
    }

    match agent.role.prompt() {
        Some(role_prompt) => role_prompt.system_prompt,
        None => CUSTOM_FALLBACK_PROMPT.to_string(),
    }
}

/// Voting guidance for an agent's role, if it has one.
pub fn voting_guidance_for(agent: &AgentConfig) -> Option<&'static str> {
    agent.role.prompt().map(|p| p.voting_guidance)
}

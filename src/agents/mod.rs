mod responder;
mod roles;
mod vote;

pub use responder::{AgentResponder, build_prompt};
pub use roles::{Role, RolePrompt, system_prompt_for, voting_guidance_for};
pub use vote::{ParsedResponse, parse_reasoning, parse_response, parse_vote};

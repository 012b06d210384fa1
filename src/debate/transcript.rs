use std::fmt::Write;

use crate::model::{Council, Debate, Round};

/// Context handed to every agent at the start of a round.
///
/// The first round only names the topic; later rounds replay every sealed
/// round so agents can respond to each other.
pub fn round_context(topic: &str, rounds: &[Round]) -> String {
    if rounds.is_empty() {
        return format!("This is the first round of debate on the topic: {}", topic);
    }

    let mut context = format!("Topic: {}\n\nPrevious rounds:\n", topic);
    for round in rounds {
        let _ = writeln!(context, "\n--- Round {} ---", round.round_number);
        for response in &round.responses {
            if response.is_error_substitute() {
                let _ = writeln!(
                    context,
                    "\n{} ({}): [no response this round]",
                    response.agent_name, response.role
                );
                continue;
            }
            let _ = writeln!(
                context,
                "\n{} ({}):\n{}",
                response.agent_name, response.role, response.content
            );
        }
        if let Some(tally) = round.tally {
            let _ = writeln!(context, "\nVotes: {}", tally);
        }
    }

    context
}

/// Markdown transcript of the whole debate, used by the moderator.
pub fn full_transcript(debate: &Debate) -> String {
    let mut text = String::new();
    for round in &debate.rounds {
        let _ = writeln!(text, "\n### Round {}", round.round_number);
        for response in &round.responses {
            let _ = writeln!(
                text,
                "\n**{}** ({}):\n{}",
                response.agent_name, response.role, response.content
            );
            if let Some(vote) = response.vote {
                let _ = writeln!(text, "*Vote: {}*", vote);
            }
        }
        if let Some(tally) = round.tally {
            let _ = writeln!(text, "\n**Round votes:** {}", tally);
        }
    }
    text
}

/// One line per council member: `- name: role (provider)`.
pub fn council_members(council: &Council) -> String {
    council
        .agents
        .iter()
        .map(|a| format!("- {}: {} ({})", a.name, a.role, a.provider))
        .collect::<Vec<_>>()
        .join("\n")
}

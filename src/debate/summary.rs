use std::fmt::Write;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use super::transcript::{council_members, full_transcript};
use crate::agents::Role;
use crate::error::CouncilError;
use crate::llm::{
    GenerateRequest, LlmProvider, ProviderError, ProviderRegistry, RetryConfig, retry_with_backoff,
};
use crate::model::{Council, Debate};

const SUMMARY_MAX_TOKENS: u32 = 2048;
const SUMMARY_TEMPERATURE: f32 = 0.3;
const MAX_POINTS: usize = 5;

static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s#>*_]*(summary|pro|against)(?:\s+points)?[\s*_]*:[ \t*_]*")
        .expect("section pattern is valid")
});

/// What the moderator produced for a finished debate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratorReport {
    /// Markdown summary
    pub summary: String,
    pub pro_points: Vec<String>,
    pub against_points: Vec<String>,
}

/// Produces the post-debate summary with a single moderator call.
pub struct Summarizer {
    registry: Arc<ProviderRegistry>,
    retry: RetryConfig,
    response_timeout: Duration,
}

impl Summarizer {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        retry: RetryConfig,
        response_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            retry,
            response_timeout,
        }
    }

    /// Summarize `debate`.
    ///
    /// The moderator runs on the first agent's provider and model when that
    /// provider is available, otherwise on any available provider. With no
    /// provider at all a plain tally summary is returned.
    pub async fn summarize(
        &self,
        council: &Council,
        debate: &Debate,
    ) -> Result<ModeratorReport, CouncilError> {
        let Some((provider, model)) = self.select_moderator(council) else {
            info!(
                debate_id = %debate.id,
                "no provider available for moderation, using fallback summary"
            );
            return Ok(fallback_report(debate));
        };

        let system_prompt = Role::Moderator
            .prompt()
            .map(|p| p.system_prompt)
            .unwrap_or_default();
        let prompt = build_summary_prompt(council, debate);
        let request = GenerateRequest {
            prompt: &prompt,
            system_prompt: &system_prompt,
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: SUMMARY_MAX_TOKENS,
            model: model.as_deref(),
        };

        debug!(debate_id = %debate.id, provider = provider.name(), "requesting moderator summary");

        let provider: &dyn LlmProvider = provider.as_ref();
        let request = &request;
        let response_timeout = self.response_timeout;
        let text = retry_with_backoff(&self.retry, "moderator summary", move || async move {
            timeout(response_timeout, provider.generate(request))
                .await
                .map_err(|_| ProviderError::timeout("moderator summary timed out"))?
        })
        .await?;

        let report = parse_report(&text);
        if report.summary.is_empty() {
            return Err(CouncilError::Debate(
                "moderator returned an empty summary".to_string(),
            ));
        }
        Ok(report)
    }

    fn select_moderator(
        &self,
        council: &Council,
    ) -> Option<(Arc<dyn LlmProvider>, Option<String>)> {
        if let Some(first) = council.agents.first() {
            match self.registry.resolve(&first.provider) {
                Ok(provider) => return Some((provider, first.model.clone())),
                Err(e) => warn!(
                    provider = %first.provider,
                    error = %e,
                    "preferred moderator provider unavailable"
                ),
            }
        }

        self.registry
            .list_available()
            .into_iter()
            .find_map(|id| self.registry.resolve(&id).ok())
            .map(|provider| (provider, None))
    }
}

fn build_summary_prompt(council: &Council, debate: &Debate) -> String {
    format!(
        "Summarize this council debate.\n\n\
         **Topic:** {}\n\n\
         **Council members:**\n{}\n\n\
         **Debate rounds:**\n{}\n\n\
         **Final status:** {}\n\n\
         Answer in exactly three sections:\n\n\
         SUMMARY:\n\
         A Markdown summary with an executive summary, key discussion points, \
         areas of agreement, areas of disagreement and a conclusion.\n\n\
         PRO:\n\
         A numbered list of the 3-5 strongest arguments in favor, one per line.\n\n\
         AGAINST:\n\
         A numbered list of the 3-5 strongest arguments against or concerns raised, one per line.\n",
        debate.topic,
        council_members(council),
        full_transcript(debate),
        debate.status
    )
}

/// Split a moderator answer into summary and point lists.
///
/// Text without section markers is taken as the summary.
pub fn parse_report(text: &str) -> ModeratorReport {
    let markers: Vec<(String, usize, usize)> = SECTION_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_lowercase();
            Some((name, whole.start(), whole.end()))
        })
        .collect();

    if markers.is_empty() {
        return ModeratorReport {
            summary: text.trim().to_string(),
            pro_points: Vec::new(),
            against_points: Vec::new(),
        };
    }

    let mut summary = None;
    let mut pro_points = Vec::new();
    let mut against_points = Vec::new();

    for (i, (name, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(text.len(), |(_, start, _)| *start);
        let body = &text[*body_start..body_end];
        match name.as_str() {
            "summary" => summary = Some(body.trim().to_string()),
            "pro" => pro_points = parse_points(body),
            "against" => against_points = parse_points(body),
            _ => {}
        }
    }

    let summary = summary.unwrap_or_else(|| text[..markers[0].1].trim().to_string());

    ModeratorReport {
        summary,
        pro_points,
        against_points,
    }
}

/// Parse a numbered or bulleted list, keeping at most five points.
pub fn parse_points(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_list_prefix)
        .filter(|line| !line.is_empty())
        .take(MAX_POINTS)
        .map(str::to_string)
        .collect()
}

fn strip_list_prefix(line: &str) -> &str {
    let line = line.trim();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    let rest = if digits > 0 {
        let after = &line[digits..];
        after
            .strip_prefix('.')
            .or_else(|| after.strip_prefix(')'))
            .unwrap_or(line)
    } else {
        line.strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| line.strip_prefix('•'))
            .or_else(|| line.strip_prefix('-'))
            .unwrap_or(line)
    };
    rest.trim()
}

/// Summary built from vote tallies alone.
pub fn fallback_report(debate: &Debate) -> ModeratorReport {
    let mut rounds = String::new();
    for round in &debate.rounds {
        let tally = round.tally.unwrap_or_default();
        let _ = writeln!(
            rounds,
            "- Round {}: Agree({}), Disagree({}), Abstain({})",
            round.round_number, tally.agree, tally.disagree, tally.abstain
        );
    }

    let summary = format!(
        "# Debate Summary\n\n## Topic\n{}\n\n## Status\n{}\n\n## Rounds\n{}\n## Note\n\
         Detailed summary not available (no provider configured for moderation).\n",
        debate.topic, debate.status, rounds
    );

    ModeratorReport {
        summary,
        pro_points: Vec::new(),
        against_points: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::model::{AgentConfig, DebateStatus, Round, Vote};

    #[test]
    fn test_parse_report_sections() {
        let text =
            "SUMMARY:\nThe council agreed.\n\nPRO:\n1. Cheap\n2) Fast\n\nAGAINST:\n- Risky\n* Untested\n• Novel";
        let report = parse_report(text);
        assert_eq!(report.summary, "The council agreed.");
        assert_eq!(report.pro_points, vec!["Cheap", "Fast"]);
        assert_eq!(report.against_points, vec!["Risky", "Untested", "Novel"]);
    }

    #[test]
    fn test_parse_report_markdown_headings() {
        let text = "## Summary:\nAll good.\n\n**Pro points:**\n1. One\n\n### Against:\n1. Two";
        let report = parse_report(text);
        assert_eq!(report.summary, "All good.");
        assert_eq!(report.pro_points, vec!["One"]);
        assert_eq!(report.against_points, vec!["Two"]);
    }

    #[test]
    fn test_parse_report_without_markers() {
        let report = parse_report("  Just prose.  ");
        assert_eq!(report.summary, "Just prose.");
        assert!(report.pro_points.is_empty());
    }

    #[test]
    fn test_points_capped_at_five() {
        let text = (1..=8).map(|i| format!("{}. point {}", i, i)).collect::<Vec<_>>().join("\n");
        let points = parse_points(&text);
        assert_eq!(points.len(), 5);
        assert_eq!(points[4], "point 5");
    }

    #[test]
    fn test_numbers_inside_text_are_kept() {
        assert_eq!(parse_points("2024 was a good year"), vec!["2024 was a good year"]);
        assert_eq!(parse_points("10. Tenth"), vec!["Tenth"]);
    }

    fn finished_debate() -> Debate {
        let agent = AgentConfig::new("Ada", "mock", Role::TechStrategist);
        let mut debate = Debate::new("c", "Adopt Rust?").unwrap();
        debate.status = DebateStatus::InProgress;
        let mut round = Round::new(1);
        let mut response = crate::model::AgentResponse::new(&agent, "Yes");
        response.vote = Some(Vote::Agree);
        round.record(response);
        round.seal(0.8);
        debate.push_round(round).unwrap();
        debate.finish(DebateStatus::ConsensusReached, None);
        debate
    }

    #[test]
    fn test_fallback_lists_tallies() {
        let report = fallback_report(&finished_debate());
        assert!(report.summary.contains("Adopt Rust?"));
        assert!(report.summary.contains("consensus_reached"));
        assert!(report.summary.contains("Round 1: Agree(1), Disagree(0), Abstain(0)"));
        assert!(report.pro_points.is_empty());
    }

    struct Moderator;

    #[async_trait]
    impl LlmProvider for Moderator {
        async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ProviderError> {
            assert_eq!(request.model, Some("mod-model"));
            Ok("SUMMARY:\nDone.\nPRO:\n1. Safe\nAGAINST:\n1. Slow".to_string())
        }

        fn name(&self) -> &str {
            "moderator"
        }
    }

    fn summarizer(registry: ProviderRegistry) -> Summarizer {
        Summarizer::new(Arc::new(registry), RetryConfig::new(1, 1), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_uses_first_agent_provider_and_model() {
        let registry = ProviderRegistry::new();
        registry.register("mod", Moderator);
        let council = Council::new(
            "c",
            vec![AgentConfig::new("Ada", "mod", Role::TechStrategist).with_model("mod-model")],
        );

        let report = summarizer(registry)
            .summarize(&council, &finished_debate())
            .await
            .unwrap();
        assert_eq!(report.summary, "Done.");
        assert_eq!(report.pro_points, vec!["Safe"]);
        assert_eq!(report.against_points, vec!["Slow"]);
    }

    #[tokio::test]
    async fn test_no_provider_falls_back() {
        let council = Council::new(
            "c",
            vec![AgentConfig::new("Ada", "gone", Role::TechStrategist)],
        );
        let report = summarizer(ProviderRegistry::new())
            .summarize(&council, &finished_debate())
            .await
            .unwrap();
        assert!(report.summary.starts_with("# Debate Summary"));
    }
}

//! Vote extraction from free-text agent responses.
//!
//! Agents are asked to end their response with a trailer:
//!
//! ```text
//! VOTE: AGREE
//! REASONING: one or two sentences
//! ```
//!
//! Every heuristic for reading that trailer lives in this module.
//! Parsing rules:
//! - the marker must start a line, optionally behind markdown decoration
//!   (`**VOTE:** agree`, `- Vote - [DISAGREE]`, `> vote = abstain`)
//! - case is ignored
//! - when several markers appear, the last one wins
//! - an echoed template (`VOTE: AGREE/DISAGREE/ABSTAIN`) is not a vote
//! - a vote word in prose ("I agree with Ada") is not a vote
//!
//! When no marker is found the caller records [`Vote::DEFAULT`].

use std::sync::LazyLock;

use regex::Regex;

use crate::model::Vote;

static VOTE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)^[\s>#*_\-]*vote[\s*_]*[:=\-][\s*_\[("'`]*(agree|disagree|abstain)\b(\s*/)?"#,
    )
    .expect("vote pattern is valid")
});

static REASONING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s>#*_\-]*reasoning[\s*_]*[:=\-][\s*_]*")
        .expect("reasoning pattern is valid")
});

/// A response split into its discussion text and vote trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Text before the vote trailer (the whole text when there is no trailer)
    pub content: String,
    pub vote: Option<Vote>,
    pub reasoning: Option<String>,
}

/// Extract the vote from `text`, or `None` when no marker is present.
pub fn parse_vote(text: &str) -> Option<Vote> {
    find_vote(text).map(|(vote, _)| vote)
}

/// Extract the text following the last `REASONING:` marker.
pub fn parse_reasoning(text: &str) -> Option<String> {
    let marker = REASONING_MARKER.find_iter(text).last()?;
    let reasoning = text[marker.end()..].trim();
    let reasoning = strip_trailing_vote(reasoning).trim();
    (!reasoning.is_empty()).then(|| reasoning.to_string())
}

/// Split a full response into content, vote and reasoning.
pub fn parse_response(text: &str) -> ParsedResponse {
    let found = find_vote(text);
    let reasoning = parse_reasoning(text);

    let trailer_start = [
        found.map(|(_, start)| start),
        REASONING_MARKER.find_iter(text).last().map(|m| m.start()),
    ]
    .into_iter()
    .flatten()
    .min();

    let content = match trailer_start {
        Some(start) if !text[..start].trim().is_empty() => text[..start].trim_end(),
        _ => text.trim(),
    };

    ParsedResponse {
        content: content.to_string(),
        vote: found.map(|(vote, _)| vote),
        reasoning,
    }
}

/// Last genuine vote marker and the byte offset where its line starts.
fn find_vote(text: &str) -> Option<(Vote, usize)> {
    VOTE_MARKER
        .captures_iter(text)
        .filter(|caps| caps.get(2).is_none())
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let vote = caps.get(1)?.as_str().parse::<Vote>().ok()?;
            Some((vote, start))
        })
        .last()
}

/// Drop a vote marker that follows the reasoning text.
fn strip_trailing_vote(text: &str) -> &str {
    match VOTE_MARKER.find_iter(text).last() {
        Some(m) if m.start() > 0 => &text[..m.start()],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_marker() {
        assert_eq!(parse_vote("Good idea.\nVOTE: AGREE"), Some(Vote::Agree));
        assert_eq!(parse_vote("VOTE: DISAGREE"), Some(Vote::Disagree));
        assert_eq!(parse_vote("VOTE: ABSTAIN"), Some(Vote::Abstain));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(parse_vote("vote: agree"), Some(Vote::Agree));
        assert_eq!(parse_vote("Vote: Disagree."), Some(Vote::Disagree));
    }

    #[test]
    fn test_disagree_is_not_read_as_agree() {
        assert_eq!(parse_vote("VOTE: disagree"), Some(Vote::Disagree));
        assert_eq!(parse_vote("VOTE:DISAGREE"), Some(Vote::Disagree));
    }

    #[test]
    fn test_markdown_decoration() {
        assert_eq!(parse_vote("**VOTE:** AGREE"), Some(Vote::Agree));
        assert_eq!(parse_vote("**VOTE**: **DISAGREE**"), Some(Vote::Disagree));
        assert_eq!(parse_vote("- Vote - [abstain]"), Some(Vote::Abstain));
        assert_eq!(parse_vote("> vote = agree"), Some(Vote::Agree));
        assert_eq!(parse_vote("## Vote: `disagree`"), Some(Vote::Disagree));
        assert_eq!(parse_vote("   VOTE: (Agree)"), Some(Vote::Agree));
    }

    #[test]
    fn test_last_marker_wins() {
        let text = "Initially I thought\nVOTE: DISAGREE\nbut on reflection\nVOTE: AGREE";
        assert_eq!(parse_vote(text), Some(Vote::Agree));
    }

    #[test]
    fn test_echoed_template_is_ignored() {
        assert_eq!(parse_vote("VOTE: [AGREE/DISAGREE/ABSTAIN]"), None);
        assert_eq!(parse_vote("VOTE: AGREE / DISAGREE"), None);

        let text = "Format: VOTE: AGREE/DISAGREE\n\nVOTE: DISAGREE";
        assert_eq!(parse_vote(text), Some(Vote::Disagree));
    }

    #[test]
    fn test_prose_is_not_a_vote() {
        assert_eq!(parse_vote("I agree with Ada on most points."), None);
        assert_eq!(parse_vote("I would vote to disagree here"), None);
        assert_eq!(parse_vote("My vote: I lean towards agree"), None);
    }

    #[test]
    fn test_missing_or_malformed_marker() {
        assert_eq!(parse_vote(""), None);
        assert_eq!(parse_vote("VOTE:"), None);
        assert_eq!(parse_vote("VOTE: MAYBE"), None);
        assert_eq!(parse_vote("VOTE: agreeable"), None);
        assert_eq!(parse_vote("VOTES: agree"), None);
    }

    #[test]
    fn test_reasoning_extraction() {
        let text = "Analysis here.\n\nVOTE: AGREE\nREASONING: The numbers add up.";
        assert_eq!(parse_reasoning(text).as_deref(), Some("The numbers add up."));

        let reversed = "Analysis.\nREASONING: Too risky.\nVOTE: DISAGREE";
        assert_eq!(parse_reasoning(reversed).as_deref(), Some("Too risky."));

        assert_eq!(parse_reasoning("REASONING:   "), None);
        assert_eq!(parse_reasoning("no marker"), None);
    }

    #[test]
    fn test_parse_response_splits_trailer() {
        let text =
            "We should proceed carefully.\n\n**VOTE:** agree\n**REASONING:** Risks are bounded.";
        let parsed = parse_response(text);
        assert_eq!(parsed.content, "We should proceed carefully.");
        assert_eq!(parsed.vote, Some(Vote::Agree));
        assert_eq!(parsed.reasoning.as_deref(), Some("Risks are bounded."));
    }

    #[test]
    fn test_parse_response_without_trailer_keeps_text() {
        let parsed = parse_response("  Just an opinion.  ");
        assert_eq!(parsed.content, "Just an opinion.");
        assert_eq!(parsed.vote, None);
        assert_eq!(parsed.reasoning, None);
    }

    #[test]
    fn test_parse_response_trailer_only() {
        let parsed = parse_response("VOTE: ABSTAIN");
        assert_eq!(parsed.content, "VOTE: ABSTAIN");
        assert_eq!(parsed.vote, Some(Vote::Abstain));
    }
}

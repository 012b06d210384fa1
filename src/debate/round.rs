use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, info};

use super::transcript::round_context;
use crate::agents::AgentResponder;
use crate::event::{Event, EventSender};
use crate::model::{AgentResponse, Council, Round};

/// Runs a single round: every agent responds concurrently, then votes are
/// tallied against the council's threshold.
pub struct RoundOrchestrator {
    responder: Arc<AgentResponder>,
}

impl RoundOrchestrator {
    pub fn new(responder: Arc<AgentResponder>) -> Self {
        Self { responder }
    }

    /// Run round `round_number` to completion and return it sealed.
    ///
    /// Every agent in the council contributes exactly one response. A failed
    /// or panicked agent call becomes an error-substitute and never cancels
    /// the other agents. Responses are recorded in completion order.
    pub async fn run_round(
        &self,
        council: &Council,
        topic: &str,
        prior_rounds: &[Round],
        round_number: u32,
        events: &EventSender,
    ) -> Round {
        info!(
            council = %council.name,
            round = round_number,
            agents = council.agents.len(),
            "round starting"
        );
        events
            .emit_blocking(Event::RoundStart {
                round: round_number,
            })
            .await;

        let context: Arc<str> = Arc::from(round_context(topic, prior_rounds));
        let mut round = Round::new(round_number);

        for agent in &council.agents {
            events.emit(Event::AgentThinking {
                round: round_number,
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
            });
        }

        let mut pending = FuturesUnordered::new();
        for agent in &council.agents {
            let responder = Arc::clone(&self.responder);
            let task_agent = agent.clone();
            let task_context = Arc::clone(&context);
            let task_events = events.clone();

            let handle = tokio::spawn(async move {
                responder
                    .respond(&task_agent, &task_context, round_number, &task_events)
                    .await
            });

            let agent = agent.clone();
            pending.push(async move { (agent, handle.await) });
        }

        while let Some((agent, result)) = pending.next().await {
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        agent = %agent.name,
                        round = round_number,
                        error = %e,
                        "agent task failed"
                    );
                    AgentResponse::error_substitute(&agent, format!("agent task failed: {}", e))
                }
            };

            debug!(
                agent = %response.agent_name,
                round = round_number,
                failed = response.is_error_substitute(),
                "agent settled"
            );
            events
                .emit_blocking(Event::AgentResponse {
                    round: round_number,
                    response: response.clone(),
                })
                .await;
            round.record(response);
        }

        for response in &round.responses {
            events
                .emit_blocking(Event::Vote {
                    round: round_number,
                    agent_id: response.agent_id.clone(),
                    agent_name: response.agent_name.clone(),
                    vote: response.effective_vote(),
                })
                .await;
        }

        round.seal(council.consensus_threshold);
        let tally = round.tally.unwrap_or_default();

        info!(
            round = round_number,
            %tally,
            consensus = round.consensus_reached,
            failed_agents = round.failed_agents(),
            "round complete"
        );
        events
            .emit_blocking(Event::RoundComplete {
                round: round_number,
                tally,
                consensus: round.consensus_reached,
            })
            .await;

        round
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    use super::*;
    use crate::agents::Role;
    use crate::llm::{GenerateRequest, LlmProvider, ProviderError, ProviderRegistry, RetryConfig};
    use crate::model::{AgentConfig, Vote};

    /// Answers with a fixed text after a fixed delay; panics when told to.
    struct Canned {
        text: &'static str,
        delay: Duration,
        panic: bool,
    }

    #[async_trait]
    impl LlmProvider for Canned {
        async fn generate(&self, _request: &GenerateRequest<'_>) -> Result<String, ProviderError> {
            tokio::time::sleep(self.delay).await;
            if self.panic {
                panic!("provider blew up");
            }
            Ok(self.text.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn orchestrator(providers: Vec<(&str, Canned)>) -> RoundOrchestrator {
        let registry = ProviderRegistry::new();
        for (id, provider) in providers {
            registry.register(id, provider);
        }
        let responder = AgentResponder::new(Arc::new(registry)).with_retry(RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
        RoundOrchestrator::new(Arc::new(responder))
    }

    fn canned(text: &'static str, delay_ms: u64) -> Canned {
        Canned {
            text,
            delay: Duration::from_millis(delay_ms),
            panic: false,
        }
    }

    fn council(providers: &[&str]) -> Council {
        let agents = providers
            .iter()
            .enumerate()
            .map(|(i, p)| {
                AgentConfig::new(format!("agent{}", i), *p, Role::TechStrategist)
                    .with_id(format!("a{}", i))
            })
            .collect();
        Council::new("test", agents)
    }

    #[tokio::test]
    async fn test_unanimous_round_reaches_consensus() {
        let orchestrator = orchestrator(vec![("yes", canned("Fine.\nVOTE: AGREE", 1))]);
        let council = council(&["yes", "yes", "yes"]);

        let round = orchestrator
            .run_round(&council, "topic", &[], 1, &EventSender::noop())
            .await;

        assert_eq!(round.round_number, 1);
        assert_eq!(round.responses.len(), 3);
        assert_eq!(round.votes.len(), 3);
        assert!(round.consensus_reached);
        assert!(round.is_sealed());
    }

    #[tokio::test]
    async fn test_panicking_agent_is_isolated() {
        let orchestrator = orchestrator(vec![
            ("yes", canned("VOTE: AGREE", 1)),
            (
                "boom",
                Canned {
                    text: "",
                    delay: Duration::from_millis(1),
                    panic: true,
                },
            ),
        ]);
        let council = council(&["yes", "boom", "yes"]);

        let round = orchestrator
            .run_round(&council, "topic", &[], 1, &EventSender::noop())
            .await;

        assert_eq!(round.responses.len(), 3);
        let failed: Vec<_> = round
            .responses
            .iter()
            .filter(|r| r.is_error_substitute())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].agent_id, "a1");
        assert_eq!(round.votes["a1"], Vote::Abstain);
        // 2 agree, 1 abstain: abstentions do not count against consensus
        assert!(round.consensus_reached);
    }

    #[tokio::test]
    async fn test_all_agents_failing_seals_degraded_round() {
        let orchestrator = orchestrator(vec![]);
        let council = council(&["missing", "missing"]);

        let round = orchestrator
            .run_round(&council, "topic", &[], 1, &EventSender::noop())
            .await;

        assert!(round.is_sealed());
        assert!(round.is_degraded());
        assert!(!round.consensus_reached);
        assert_eq!(round.votes.len(), 2);
    }

    #[tokio::test]
    async fn test_events_follow_round_protocol() {
        let orchestrator = orchestrator(vec![
            ("fast", canned("VOTE: AGREE", 1)),
            ("slow", canned("VOTE: DISAGREE", 50)),
        ]);
        let council = council(&["slow", "fast"]);
        let (tx, mut rx) = mpsc::channel(64);
        let events = EventSender::new(tx, "d1");

        let round = orchestrator.run_round(&council, "topic", &[], 1, &events).await;
        drop(events);

        let mut types = Vec::new();
        let mut response_order = Vec::new();
        while let Some(update) = rx.recv().await {
            if let Event::AgentResponse { ref response, .. } = update.event {
                response_order.push(response.agent_id.clone());
            }
            types.push(update.event_type());
        }

        assert_eq!(types.first(), Some(&"round_start"));
        assert_eq!(types.last(), Some(&"round_complete"));
        assert_eq!(types.iter().filter(|t| **t == "agent_thinking").count(), 2);
        assert_eq!(types.iter().filter(|t| **t == "vote").count(), 2);

        let first_vote = types.iter().position(|t| *t == "vote").unwrap();
        let last_response = types.iter().rposition(|t| *t == "agent_response").unwrap();
        assert!(last_response < first_vote);

        // Completion order, not configuration order
        assert_eq!(response_order, vec!["a1".to_string(), "a0".to_string()]);
        let recorded: Vec<_> = round.responses.iter().map(|r| r.agent_id.clone()).collect();
        assert_eq!(recorded, response_order);
        assert!(!round.consensus_reached);
    }

    #[tokio::test]
    async fn test_every_agent_votes_exactly_once() {
        let orchestrator = orchestrator(vec![
            ("yes", canned("VOTE: AGREE", 5)),
            ("no", canned("VOTE: DISAGREE", 1)),
            ("meh", canned("nothing to add", 3)),
        ]);
        let council = council(&["yes", "no", "meh"]);

        let round = orchestrator
            .run_round(&council, "topic", &[], 1, &EventSender::noop())
            .await;

        let ids: HashSet<_> = round.responses.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["a0", "a1", "a2"]));

        let expected: HashMap<String, Vote> = HashMap::from([
            ("a0".to_string(), Vote::Agree),
            ("a1".to_string(), Vote::Disagree),
            ("a2".to_string(), Vote::Abstain),
        ]);
        let votes: HashMap<String, Vote> = round.votes.clone().into_iter().collect();
        assert_eq!(votes, expected);
    }
}

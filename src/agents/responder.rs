use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use super::roles::{system_prompt_for, voting_guidance_for};
use super::vote::parse_response;
use crate::config::DebateSettings;
use crate::event::EventSender;
use crate::llm::{
    GenerateRequest, LlmProvider, ProviderError, ProviderRegistry, RetryConfig, retry_with_backoff,
};
use crate::model::{AgentConfig, AgentResponse};

/// Token channel capacity for streaming.
const TOKEN_CHANNEL_CAPACITY: usize = 64;

/// Turns one agent's turn in a round into an [`AgentResponse`].
///
/// Never fails: any error (provider missing, retries exhausted, timeout) is
/// folded into an error-substitute response that abstains.
pub struct AgentResponder {
    registry: Arc<ProviderRegistry>,
    retry: RetryConfig,
    temperature: f32,
    max_tokens: u32,
    response_timeout: Duration,
}

impl AgentResponder {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::from_settings(registry, &DebateSettings::default(), RetryConfig::default())
    }

    pub fn from_settings(
        registry: Arc<ProviderRegistry>,
        settings: &DebateSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            registry,
            retry,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            response_timeout: settings.response_timeout(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bound on a single generation attempt.
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Produce this agent's response for `round`, given the rendered context
    /// of the debate so far.
    pub async fn respond(
        &self,
        agent: &AgentConfig,
        context: &str,
        round: u32,
        events: &EventSender,
    ) -> AgentResponse {
        let provider = match self.registry.resolve(&agent.provider) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(
                    agent = %agent.name,
                    provider = %agent.provider,
                    error = %e,
                    "provider unavailable"
                );
                return AgentResponse::error_substitute(agent, e.to_string());
            }
        };

        let system_prompt = system_prompt_for(agent);
        let prompt = build_prompt(agent, context, round);
        let request = GenerateRequest {
            prompt: &prompt,
            system_prompt: &system_prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            model: agent.model.as_deref(),
        };

        info!(agent = %agent.name, provider = %agent.provider, round, "requesting response");

        let provider: &dyn LlmProvider = provider.as_ref();
        let request = &request;
        let operation = format!("{} round {}", agent.name, round);
        let result = retry_with_backoff(&self.retry, &operation, move || {
            self.attempt(provider, request, agent, round, events)
        })
        .await;

        match result {
            Ok(text) => {
                let parsed = parse_response(&text);
                debug!(
                    agent = %agent.name,
                    round,
                    vote = ?parsed.vote,
                    len = text.len(),
                    "response received"
                );
                if parsed.vote.is_none() {
                    warn!(agent = %agent.name, round, "no vote marker found, abstaining");
                }
                let mut response = AgentResponse::new(agent, parsed.content);
                response.vote = parsed.vote;
                response.reasoning = parsed.reasoning;
                response
            }
            Err(e) => {
                warn!(agent = %agent.name, round, error = %e, "agent failed to respond");
                AgentResponse::error_substitute(agent, e.to_string())
            }
        }
    }

    /// One bounded generation attempt.
    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        request: &GenerateRequest<'_>,
        agent: &AgentConfig,
        round: u32,
        events: &EventSender,
    ) -> Result<String, ProviderError> {
        let call = async {
            if provider.supports_streaming() && events.is_active() {
                generate_streaming(provider, request, agent, round, events).await
            } else {
                provider.generate(request).await
            }
        };

        timeout(self.response_timeout, call).await.map_err(|_| {
            ProviderError::timeout(format!(
                "{} did not respond within {} seconds",
                agent.name,
                self.response_timeout.as_secs_f64()
            ))
        })?
    }
}

async fn generate_streaming(
    provider: &dyn LlmProvider,
    request: &GenerateRequest<'_>,
    agent: &AgentConfig,
    round: u32,
    events: &EventSender,
) -> Result<String, ProviderError> {
    let (token_tx, mut token_rx) = mpsc::channel::<String>(TOKEN_CHANNEL_CAPACITY);
    let events_clone = events.clone();
    let agent_id = agent.id.clone();
    let agent_name = agent.name.clone();

    // Spawn a task to forward fragments to the event channel
    let forwarder = tokio::spawn(async move {
        while let Some(chunk) = token_rx.recv().await {
            events_clone.emit_chunk(round, &agent_id, &agent_name, chunk);
        }
    });

    let response = provider.generate_stream(request, token_tx).await;

    // The sender was moved into the call, so the forwarder ends once it drains
    let _ = forwarder.await;

    response
}

/// User-turn prompt for one agent in one round.
pub fn build_prompt(agent: &AgentConfig, context: &str, round: u32) -> String {
    let mut prompt = format!(
        "You are {}, participating in a council debate.\n\n{}\n\n\
         This is round {}. Give your perspective, responding to the viewpoints \
         already shared. Be concise but thorough and focus on your area of expertise ({}).\n",
        agent.name, context, round, agent.role
    );

    prompt.push_str(
        "\nEnd your response with these two lines:\n\
         VOTE: AGREE, DISAGREE or ABSTAIN\n\
         REASONING: one or two sentences explaining your vote\n\n\
         Vote AGREE if you believe the council is converging on a sound conclusion. \
         Vote DISAGREE if significant concerns still need discussion. \
         Vote ABSTAIN if you are uncertain or need more information.\n",
    );

    if let Some(guidance) = voting_guidance_for(agent) {
        prompt.push_str(guidance);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::agents::Role;
    use crate::llm::ProviderErrorKind;
    use crate::model::Vote;

    /// Replays scripted results and counts calls.
    struct Scripted {
        results: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(results: Vec<Result<String, ProviderError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    results: Mutex::new(results.into()),
                    calls: Arc::clone(&calls),
                    delay: None,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn generate(&self, _request: &GenerateRequest<'_>) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("VOTE: ABSTAIN".to_string()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn responder_with(provider: Scripted) -> AgentResponder {
        let registry = ProviderRegistry::new();
        registry.register("scripted", provider);
        AgentResponder::new(Arc::new(registry)).with_retry(fast_retry())
    }

    fn agent() -> AgentConfig {
        AgentConfig::new("Ada", "scripted", Role::TechStrategist).with_id("ada")
    }

    #[tokio::test]
    async fn test_parses_vote_and_reasoning() {
        let (provider, _) = Scripted::new(vec![Ok(
            "Ship it.\n\nVOTE: AGREE\nREASONING: Low risk.".to_string()
        )]);
        let responder = responder_with(provider);

        let response = responder
            .respond(&agent(), "context", 1, &EventSender::noop())
            .await;

        assert!(!response.is_error_substitute());
        assert_eq!(response.content, "Ship it.");
        assert_eq!(response.vote, Some(Vote::Agree));
        assert_eq!(response.reasoning.as_deref(), Some("Low risk."));
        assert_eq!(response.agent_id, "ada");
    }

    #[tokio::test]
    async fn test_missing_marker_abstains() {
        let (provider, _) = Scripted::new(vec![Ok("No idea.".to_string())]);
        let response = responder_with(provider)
            .respond(&agent(), "context", 1, &EventSender::noop())
            .await;

        assert_eq!(response.vote, None);
        assert_eq!(response.effective_vote(), Vote::Abstain);
    }

    #[tokio::test]
    async fn test_unknown_provider_yields_error_substitute() {
        let responder = AgentResponder::new(Arc::new(ProviderRegistry::new()));
        let response = responder
            .respond(&agent(), "context", 1, &EventSender::noop())
            .await;

        assert!(response.is_error_substitute());
        assert_eq!(response.vote, Some(Vote::Abstain));
        assert!(response.error.unwrap().contains("scripted"));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (provider, calls) = Scripted::new(vec![
            Err(ProviderError::new(ProviderErrorKind::RateLimit, "429")),
            Ok("VOTE: DISAGREE".to_string()),
        ]);
        let response = responder_with(provider)
            .respond(&agent(), "context", 1, &EventSender::noop())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(response.vote, Some(Vote::Disagree));
    }

    #[tokio::test]
    async fn test_authentication_error_fails_fast() {
        let (provider, calls) = Scripted::new(vec![Err(ProviderError::new(
            ProviderErrorKind::Authentication,
            "bad key",
        ))]);
        let response = responder_with(provider)
            .respond(&agent(), "context", 1, &EventSender::noop())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(response.is_error_substitute());
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_after_retries() {
        let (mut provider, calls) = Scripted::new(vec![]);
        provider.delay = Some(Duration::from_millis(200));
        let responder =
            responder_with(provider).with_response_timeout(Duration::from_millis(10));

        let response = responder
            .respond(&agent(), "context", 1, &EventSender::noop())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(response.is_error_substitute());
        assert_eq!(response.effective_vote(), Vote::Abstain);
    }

    #[test]
    fn test_prompt_includes_context_and_trailer() {
        let prompt = build_prompt(&agent(), "Topic: rates", 2);
        assert!(prompt.contains("Topic: rates"));
        assert!(prompt.contains("round 2"));
        assert!(prompt.contains("VOTE:"));
        assert!(prompt.contains("tech_strategist"));
    }
}

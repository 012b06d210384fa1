#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use agents_council::{
    AgentConfig, AgentsCouncil, Council, GenerateRequest, LlmProvider, ProviderError,
    ProviderErrorKind, ProviderRegistry, RetryConfig, Role,
};

enum Behavior {
    /// Replays responses in order, repeating the last one
    Scripted(Mutex<VecDeque<String>>),
    /// Always fails with this kind
    Fail(ProviderErrorKind),
}

/// A mock LLM provider with scripted answers, failures and latency.
pub struct MockProvider {
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Answer every call with `text`.
    pub fn always(text: &str) -> Self {
        Self::scripted(&[text])
    }

    /// Answer calls with `texts` in order; the last answer repeats.
    pub fn scripted(texts: &[&str]) -> Self {
        Self {
            behavior: Behavior::Scripted(Mutex::new(
                texts.iter().map(|t| t.to_string()).collect(),
            )),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every call with an error of `kind`.
    pub fn failing(kind: ProviderErrorKind) -> Self {
        Self {
            behavior: Behavior::Fail(kind),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, _request: &GenerateRequest<'_>) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior {
            Behavior::Scripted(ref queue) => {
                let mut queue = queue.lock().unwrap();
                let text = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                text.ok_or_else(|| {
                    ProviderError::new(ProviderErrorKind::Unknown, "MockProvider: empty script")
                })
            }
            Behavior::Fail(kind) => Err(ProviderError::new(kind, "MockProvider: scripted failure")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Response text ending in the vote trailer.
pub fn says(vote: &str) -> String {
    format!(
        "I have weighed the arguments.\n\nVOTE: {}\nREASONING: scripted position",
        vote
    )
}

/// Retry quickly so failure scenarios stay fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// A council whose i-th agent uses provider `providers[i]`.
pub fn council(name: &str, providers: &[&str]) -> Council {
    let roles = [
        Role::TechStrategist,
        Role::LegalAdvisor,
        Role::DevilsAdvocate,
        Role::InvestmentAdvisor,
    ];
    let agents = providers
        .iter()
        .enumerate()
        .map(|(i, provider)| {
            AgentConfig::new(format!("Agent {}", i + 1), *provider, roles[i % roles.len()])
                .with_id(format!("agent-{}", i + 1))
        })
        .collect();
    Council::new(name, agents)
}

/// In-memory instance over `registry`.
pub fn app(registry: ProviderRegistry) -> AgentsCouncil {
    AgentsCouncil::builder()
        .registry(registry)
        .memory_storage()
        .retry(fast_retry())
        .response_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

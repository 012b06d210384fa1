mod common;

use std::time::Duration;

use agents_council::{
    AgentConfig, AgentsCouncil, BackendProvider, Council, DebateStatus, GenerateRequest,
    LlmProvider, ProviderKind, ProviderRegistry, Role,
};

use common::fast_retry;

fn key_present(kind: ProviderKind) -> bool {
    std::env::var(kind.api_key_var()).is_ok_and(|k| !k.trim().is_empty())
}

#[tokio::test]
#[ignore]
async fn test_anthropic_simple_response() {
    if !key_present(ProviderKind::Anthropic) {
        return;
    }

    let provider = BackendProvider::anthropic();
    let request = GenerateRequest {
        prompt: "respond with only the word HELLO",
        system_prompt: "You are a terse assistant.",
        temperature: 0.0,
        max_tokens: 16,
        model: None,
    };

    let result = provider.generate(&request).await.expect("should get response");
    assert!(
        result.to_uppercase().contains("HELLO"),
        "expected HELLO in response, got: {}",
        result
    );
}

#[tokio::test]
#[ignore]
async fn test_openai_council_debate() {
    if !key_present(ProviderKind::OpenAI) {
        return;
    }

    let registry = ProviderRegistry::new();
    registry.register("openai", BackendProvider::openai());
    let app = AgentsCouncil::builder()
        .registry(registry)
        .memory_storage()
        .retry(fast_retry())
        .response_timeout(Duration::from_secs(120))
        .build()
        .expect("build council");

    let council = Council::new(
        "live",
        vec![
            AgentConfig::new("Ada", "openai", Role::TechStrategist),
            AgentConfig::new("Grace", "openai", Role::DevilsAdvocate),
        ],
    )
    .with_max_rounds(1);
    app.save_council(&council).await.expect("save council");

    let debate = app
        .create_debate(&council.id, "Is water wet?")
        .await
        .expect("start debate")
        .output()
        .await
        .expect("debate result");

    assert!(matches!(
        debate.status,
        DebateStatus::ConsensusReached | DebateStatus::RoundLimitReached
    ));
    assert_eq!(debate.rounds.len(), 1);
    assert!(debate.rounds[0].responses.iter().all(|r| !r.is_error_substitute()));
    assert!(debate.summary.is_some());
}

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::StreamExt;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatRole, MessageType, StreamChunk};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use super::{GenerateRequest, LlmProvider, ProviderError, ProviderErrorKind};

const API_TIMEOUT_SECS: u64 = 120;

/// The concrete backends this crate ships adapters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::OpenAI, Self::Anthropic, Self::Gemini, Self::Ollama];

    /// Identifier used in agent configs and the registry.
    pub fn id(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
            Self::Ollama => "Ollama",
        }
    }

    fn backend(self) -> LLMBackend {
        match self {
            Self::OpenAI => LLMBackend::OpenAI,
            Self::Anthropic => LLMBackend::Anthropic,
            Self::Gemini => LLMBackend::Google,
            Self::Ollama => LLMBackend::Ollama,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-1.5-flash",
            Self::Ollama => "qwen3:8b",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Ollama => "OLLAMA_API_KEY",
        }
    }

    fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    fn supports_streaming(self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => anyhow::bail!(
                "unknown provider '{}' (expected: openai, anthropic, gemini, ollama)",
                s
            ),
        }
    }
}

/// Where an adapter reads its API key from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A key fixed at construction time
    Key(String),
    /// An environment variable, read on every call
    Env(String),
    None,
}

impl Credential {
    fn resolve(&self) -> Option<String> {
        match self {
            Self::Key(key) => Some(key.clone()),
            Self::Env(var) => std::env::var(var).ok(),
            Self::None => None,
        }
        .filter(|key| !key.trim().is_empty())
    }
}

/// Provider adapter backed by the `llm` crate.
pub struct BackendProvider {
    kind: ProviderKind,
    credential: Credential,
    base_url: Option<String>,
    default_model: String,
}

impl BackendProvider {
    pub fn new(kind: ProviderKind, credential: Credential) -> Self {
        Self {
            kind,
            credential,
            base_url: None,
            default_model: kind.default_model().to_string(),
        }
    }

    /// Adapter whose key is read from the backend's standard environment variable.
    pub fn from_env(kind: ProviderKind) -> Self {
        Self::new(kind, Credential::Env(kind.api_key_var().to_string()))
    }

    pub fn openai() -> Self {
        Self::from_env(ProviderKind::OpenAI)
    }

    pub fn anthropic() -> Self {
        Self::from_env(ProviderKind::Anthropic)
    }

    pub fn gemini() -> Self {
        Self::from_env(ProviderKind::Gemini)
    }

    /// Ollama server at `base_url`; an API key is optional.
    pub fn ollama(base_url: impl Into<String>) -> Self {
        Self::from_env(ProviderKind::Ollama).with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn build_client(
        &self,
        request: &GenerateRequest<'_>,
    ) -> Result<Box<dyn llm::LLMProvider>, ProviderError> {
        // The llm crate fixes system prompt and sampling options at build time,
        // so a client is built per call.
        let model = request.model.unwrap_or(&self.default_model);
        let mut builder = LLMBuilder::new()
            .backend(self.kind.backend())
            .model(model)
            .system(request.system_prompt)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature);

        match self.credential.resolve() {
            Some(key) => builder = builder.api_key(key),
            None if self.kind.requires_api_key() => {
                return Err(ProviderError::new(
                    ProviderErrorKind::Authentication,
                    format!("{} API key not configured", self.kind.display_name()),
                ));
            }
            None => {}
        }

        if let Some(ref url) = self.base_url {
            builder = builder.base_url(url);
        }

        builder.build().map_err(|e| {
            ProviderError::classified(format!(
                "failed to build {} client: {}",
                self.kind.display_name(),
                e
            ))
        })
    }
}

fn user_message(prompt: &str) -> ChatMessage {
    ChatMessage {
        role: ChatRole::User,
        message_type: MessageType::Text,
        content: prompt.to_string(),
    }
}

#[async_trait]
impl LlmProvider for BackendProvider {
    fn name(&self) -> &str {
        self.kind.id()
    }

    fn supports_streaming(&self) -> bool {
        self.kind.supports_streaming()
    }

    fn is_available(&self) -> bool {
        if self.kind.requires_api_key() {
            self.credential.resolve().is_some()
        } else {
            self.base_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
        }
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ProviderError> {
        let client = self.build_client(request)?;
        let messages = vec![user_message(request.prompt)];
        let provider_name = self.kind.display_name();

        let response = timeout(Duration::from_secs(API_TIMEOUT_SECS), client.chat(&messages))
            .await
            .map_err(|_| {
                ProviderError::timeout(format!(
                    "{} API call timed out after {} seconds",
                    provider_name, API_TIMEOUT_SECS
                ))
            })?
            .map_err(|e| {
                ProviderError::classified(format!("{} API call failed: {}", provider_name, e))
            })?;

        let text = response.text().unwrap_or_else(|| {
            warn!("{} API returned empty response text", provider_name);
            String::new()
        });

        debug!(provider = self.kind.id(), len = text.len(), "generation complete");
        Ok(text)
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest<'_>,
        token_sender: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        if !self.kind.supports_streaming() {
            let text = self.generate(request).await?;
            let _ = token_sender.send(text.clone()).await;
            return Ok(text);
        }

        let client = self.build_client(request)?;
        let messages = vec![user_message(request.prompt)];
        let provider_name = self.kind.display_name();

        let mut stream = timeout(
            Duration::from_secs(API_TIMEOUT_SECS),
            client.chat_stream_with_tools(&messages, None),
        )
        .await
        .map_err(|_| {
            ProviderError::timeout(format!(
                "{} streaming API call timed out after {} seconds",
                provider_name, API_TIMEOUT_SECS
            ))
        })?
        .map_err(|e| {
            ProviderError::classified(format!(
                "failed to start {} streaming: {}",
                provider_name, e
            ))
        })?;

        let mut content = String::new();

        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(StreamChunk::Text(text)) => {
                    content.push_str(&text);
                    // Dropped when the receiver is full or closed
                    let _ = token_sender.try_send(text);
                }
                Ok(StreamChunk::Done { .. }) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "stream chunk error");
                    return Err(ProviderError::classified(format!(
                        "{} streaming error: {}",
                        provider_name, e
                    )));
                }
            }
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!("Google".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("mystery".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_static_key_makes_provider_available() {
        let provider =
            BackendProvider::new(ProviderKind::OpenAI, Credential::Key("sk-test".into()));
        assert!(provider.is_available());

        let blank = BackendProvider::new(ProviderKind::OpenAI, Credential::Key("  ".into()));
        assert!(!blank.is_available());
    }

    #[test]
    fn test_missing_env_key_is_unavailable() {
        let provider = BackendProvider::new(
            ProviderKind::Anthropic,
            Credential::Env("AGENTS_COUNCIL_TEST_KEY_THAT_IS_NEVER_SET".into()),
        );
        assert!(!provider.is_available());
    }

    #[test]
    fn test_ollama_availability_follows_base_url() {
        assert!(BackendProvider::ollama("http://127.0.0.1:11434").is_available());
        assert!(!BackendProvider::ollama("").is_available());
        assert!(!BackendProvider::from_env(ProviderKind::Ollama).is_available());
    }

    #[tokio::test]
    async fn test_generate_without_key_fails_with_authentication() {
        let provider = BackendProvider::new(ProviderKind::OpenAI, Credential::None);
        let request = GenerateRequest {
            prompt: "hi",
            system_prompt: "",
            temperature: 0.7,
            max_tokens: 16,
            model: None,
        };

        let err = provider.generate(&request).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Authentication);
    }
}

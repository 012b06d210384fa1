use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ProviderError;

/// A single text-generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateRequest<'a> {
    /// The user-turn prompt
    pub prompt: &'a str,
    /// The system prompt framing the persona
    pub system_prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Provider-specific model; `None` uses the adapter's default
    pub model: Option<&'a str>,
}

/// Capability interface for a text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a complete response for the request.
    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ProviderError>;

    /// Generate with token-by-token streaming.
    ///
    /// Each text fragment is sent through `token_sender` as it arrives and the
    /// accumulated text is returned when the stream completes.
    ///
    /// Default implementation falls back to [`generate`](Self::generate) and
    /// sends the complete response as a single fragment.
    async fn generate_stream(
        &self,
        request: &GenerateRequest<'_>,
        token_sender: mpsc::Sender<String>,
    ) -> Result<String, ProviderError> {
        let text = self.generate(request).await?;
        let _ = token_sender.send(text.clone()).await;
        Ok(text)
    }

    /// Whether [`generate_stream`](Self::generate_stream) emits fragments incrementally.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Whether the backend is usable right now (credentials present, endpoint configured).
    ///
    /// Checked on every registry lookup, never cached.
    fn is_available(&self) -> bool {
        true
    }

    /// Get the provider name
    fn name(&self) -> &str;
}

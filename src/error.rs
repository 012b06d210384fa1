use crate::llm::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider unavailable: {provider}: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("debate error: {0}")]
    Debate(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CouncilError {
    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{}: {}", context, err))
    }
}

use std::fmt;

/// Classes of failure a provider call can end in.
///
/// Only [`RateLimit`](Self::RateLimit), [`Timeout`](Self::Timeout) and
/// [`ModelOverloaded`](Self::ModelOverloaded) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    RateLimit,
    Timeout,
    ModelOverloaded,
    Authentication,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    /// Whether a call failing with this kind may succeed if attempted again.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::ModelOverloaded)
    }

    /// Classify raw backend error text.
    ///
    /// Backends surface HTTP failures as strings, so this looks for the status
    /// codes and phrases each vendor uses. Anything unrecognized is `Unknown`.
    pub fn classify(message: &str) -> Self {
        let text = message.to_lowercase();

        if text.contains("rate limit")
            || text.contains("rate_limit")
            || text.contains("too many requests")
            || text.contains("429")
        {
            return Self::RateLimit;
        }

        if text.contains("timeout") || text.contains("timed out") {
            return Self::Timeout;
        }

        if text.contains("overloaded")
            || text.contains("capacity")
            || text.contains("503")
            || text.contains("529")
            || text.contains("service unavailable")
        {
            return Self::ModelOverloaded;
        }

        if text.contains("401")
            || text.contains("403")
            || text.contains("unauthorized")
            || text.contains("authentication")
            || text.contains("invalid api key")
            || text.contains("invalid x-api-key")
            || text.contains("permission denied")
        {
            return Self::Authentication;
        }

        if text.contains("400")
            || text.contains("404")
            || text.contains("invalid request")
            || text.contains("invalid_request")
            || text.contains("bad request")
            || text.contains("model not found")
        {
            return Self::InvalidRequest;
        }

        Self::Unknown
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::ModelOverloaded => write!(f, "model_overloaded"),
            Self::Authentication => write!(f, "authentication"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A failed call to a text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error from provider: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose kind is inferred from the message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ProviderErrorKind::classify(&message),
            message,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

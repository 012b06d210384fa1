mod backend;
mod error;
mod provider;
mod registry;
mod retry;

pub use backend::{BackendProvider, Credential, ProviderKind};
pub use error::{ProviderError, ProviderErrorKind};
pub use provider::{GenerateRequest, LlmProvider};
pub use registry::ProviderRegistry;
pub use retry::{RetryConfig, retry_with_backoff};

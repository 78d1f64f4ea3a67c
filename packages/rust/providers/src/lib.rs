//! External capability clients: generation providers, the failover router,
//! subject suggestion, and source-document search.
//!
//! Providers are stateless and interchangeable; callers never depend on a
//! specific backend's formatting and run synthesized output through the
//! sanitizer afterwards.

mod chat;
mod router;
mod search;
mod suggest;

use std::time::Duration;

use async_trait::async_trait;

pub use chat::ChatCompletionsProvider;
pub use router::{ProviderRouter, RouterPolicy};
pub use search::{DocumentSearch, SearchHit, TavilySearch};
pub use suggest::SuggestClient;

// ---------------------------------------------------------------------------
// Generation capability
// ---------------------------------------------------------------------------

/// A single generation request: system framing plus the user prompt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Typed failure from a single provider attempt.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider asked us to slow down; `retry_after` is its suggested
    /// wait when one could be extracted from the response.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-success HTTP status outside the rate-limit case.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Connection-level transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response arrived but was not a usable completion.
    #[error("API error: {0}")]
    Api(String),

    /// The completion was present but empty.
    #[error("provider returned an empty completion")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether retrying the same provider could plausibly succeed.
    ///
    /// Auth and request-shape errors (4xx other than 429) waste attempts;
    /// the router falls straight through to the next provider for those.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout | Self::Transport(_) | Self::EmptyResponse => {
                true
            }
            Self::Http { status, .. } => *status >= 500,
            Self::Api(_) => false,
        }
    }
}

/// An interchangeable external text-generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Short display name for logs.
    fn name(&self) -> &str;

    /// Produce a completion for the request, or a classified failure.
    async fn generate(&self, request: &GenerationRequest)
    -> std::result::Result<String, ProviderError>;
}

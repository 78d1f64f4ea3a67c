//! Failover router over an ordered list of generation providers.
//!
//! Order is randomized per call to spread load across backends, but stays
//! fixed within a single call's retries. Each provider gets a bounded
//! number of attempts with backoff; rate-limit responses honor the
//! provider-suggested wait when present. The router fails only when every
//! provider is exhausted.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};

use pressgang_shared::{PressgangError, Result, RouterConfig};

use crate::{GenerationProvider, GenerationRequest, ProviderError};

/// Router retry/backoff policy.
#[derive(Debug, Clone)]
pub struct RouterPolicy {
    /// Attempts per provider before falling through to the next.
    pub max_attempts_per_provider: u32,
    /// Wait after a rate-limit response without a suggested delay.
    pub rate_limit_backoff: Duration,
    /// Wait after a generic transient error.
    pub error_backoff: Duration,
    /// Randomize provider order across calls.
    pub shuffle: bool,
}

impl From<&RouterConfig> for RouterPolicy {
    fn from(config: &RouterConfig) -> Self {
        Self {
            max_attempts_per_provider: config.max_attempts_per_provider.max(1),
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            shuffle: config.shuffle,
        }
    }
}

/// Routes generation requests across interchangeable providers.
pub struct ProviderRouter {
    providers: Vec<Arc<dyn GenerationProvider>>,
    policy: RouterPolicy,
}

impl ProviderRouter {
    /// Build a router over the given providers (at least one required).
    pub fn new(providers: Vec<Arc<dyn GenerationProvider>>, policy: RouterPolicy) -> Result<Self> {
        if providers.is_empty() {
            return Err(PressgangError::config(
                "provider router requires at least one generation provider",
            ));
        }
        Ok(Self { providers, policy })
    }

    /// Names of the configured providers, in configured order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Route a generation request, failing over on provider errors.
    #[instrument(skip_all, fields(providers = self.providers.len()))]
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut order: Vec<usize> = (0..self.providers.len()).collect();
        if self.policy.shuffle {
            order.shuffle(&mut rand::rng());
        }

        let mut last_error: Option<(String, ProviderError)> = None;

        for idx in order {
            let provider = &self.providers[idx];

            for attempt in 1..=self.policy.max_attempts_per_provider {
                match provider.generate(request).await {
                    Ok(text) if !text.trim().is_empty() => {
                        info!(provider = provider.name(), attempt, "generation succeeded");
                        return Ok(text);
                    }
                    Ok(_) => {
                        warn!(provider = provider.name(), attempt, "empty completion");
                        last_error =
                            Some((provider.name().to_string(), ProviderError::EmptyResponse));
                    }
                    Err(e) => {
                        warn!(provider = provider.name(), attempt, error = %e, "generation attempt failed");
                        let retryable = e.is_retryable();
                        last_error = Some((provider.name().to_string(), e));
                        if !retryable {
                            // Auth/request-shape problems will not improve
                            // with retries on this provider.
                            break;
                        }
                    }
                }

                if attempt < self.policy.max_attempts_per_provider {
                    tokio::time::sleep(self.backoff_for(last_error.as_ref(), attempt)).await;
                }
            }
        }

        let detail = match last_error {
            Some((name, e)) => format!("last error from {name}: {e}"),
            None => "no providers attempted".to_string(),
        };
        Err(PressgangError::Provider(format!(
            "all generation providers exhausted; {detail}"
        )))
    }

    /// Wait before the next attempt, honoring a provider-suggested delay.
    ///
    /// Rate limits wait the suggested (or configured) time as-is; generic
    /// errors back off exponentially with the attempt number.
    fn backoff_for(&self, last_error: Option<&(String, ProviderError)>, attempt: u32) -> Duration {
        match last_error {
            Some((_, ProviderError::RateLimited { retry_after })) => {
                retry_after.unwrap_or(self.policy.rate_limit_backoff)
            }
            _ => self.policy.error_backoff * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RouterPolicy {
        RouterPolicy {
            max_attempts_per_provider: 2,
            rate_limit_backoff: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
            shuffle: false,
        }
    }

    struct FixedProvider {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        response: fn() -> std::result::Result<String, ProviderError>,
    }

    impl FixedProvider {
        fn new(
            name: &'static str,
            response: fn() -> std::result::Result<String, ProviderError>,
        ) -> (Arc<dyn GenerationProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Arc::new(Self {
                name,
                calls: calls.clone(),
                response,
            });
            (provider, calls)
        }
    }

    #[async_trait]
    impl GenerationProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> std::result::Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.response)()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("system", "user")
    }

    #[tokio::test]
    async fn fails_over_to_second_provider() {
        let (failing, failing_calls) =
            FixedProvider::new("flaky", || Err(ProviderError::Transport("refused".into())));
        let (working, working_calls) = FixedProvider::new("steady", || Ok("hello".into()));

        let router = ProviderRouter::new(vec![failing, working], fast_policy()).unwrap();
        let text = router.generate(&request()).await.expect("routed success");

        assert_eq!(text, "hello");
        // The failing provider was visibly attempted before failover.
        assert!(failing_calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(working_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_all_providers_before_failing() {
        let (a, a_calls) =
            FixedProvider::new("a", || Err(ProviderError::Transport("down".into())));
        let (b, b_calls) = FixedProvider::new("b", || Err(ProviderError::Timeout));

        let router = ProviderRouter::new(vec![a, b], fast_policy()).unwrap();
        let err = router.generate(&request()).await.unwrap_err();

        assert!(err.to_string().contains("exhausted"));
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
        assert_eq!(b_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_skip_remaining_attempts() {
        let (bad_key, bad_calls) = FixedProvider::new("bad-key", || {
            Err(ProviderError::Http {
                status: 401,
                message: "invalid api key".into(),
            })
        });
        let (working, _) = FixedProvider::new("steady", || Ok("ok".into()));

        let router = ProviderRouter::new(vec![bad_key, working], fast_policy()).unwrap();
        let text = router.generate(&request()).await.expect("routed success");

        assert_eq!(text, "ok");
        // One attempt only: a 401 will not improve with retries.
        assert_eq!(bad_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_completions_are_not_accepted() {
        let (empty, _) = FixedProvider::new("empty", || Ok("   ".into()));
        let (working, _) = FixedProvider::new("steady", || Ok("real content".into()));

        let router = ProviderRouter::new(vec![empty, working], fast_policy()).unwrap();
        let text = router.generate(&request()).await.expect("routed success");
        assert_eq!(text, "real content");
    }

    #[tokio::test]
    async fn rejects_empty_provider_list() {
        let result = ProviderRouter::new(vec![], fast_policy());
        assert!(result.is_err());
    }

    #[test]
    fn retryability_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(
            ProviderError::Http {
                status: 503,
                message: "unavailable".into()
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::Http {
                status: 401,
                message: "unauthorized".into()
            }
            .is_retryable()
        );
        assert!(!ProviderError::Api("schema mismatch".into()).is_retryable());
    }

    #[test]
    fn backoff_honors_suggested_wait_and_grows_on_generic_errors() {
        let (p, _) = FixedProvider::new("p", || Ok("x".into()));
        let policy = RouterPolicy {
            max_attempts_per_provider: 3,
            rate_limit_backoff: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
            shuffle: false,
        };
        let router = ProviderRouter::new(vec![p], policy).unwrap();

        let rate_limited = (
            "p".to_string(),
            ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(7)),
            },
        );
        assert_eq!(
            router.backoff_for(Some(&rate_limited), 1),
            Duration::from_secs(7)
        );

        let generic = ("p".to_string(), ProviderError::Timeout);
        assert_eq!(router.backoff_for(Some(&generic), 1), Duration::from_secs(5));
        assert_eq!(router.backoff_for(Some(&generic), 2), Duration::from_secs(10));
    }

    #[test]
    fn policy_from_config_honors_settings() {
        let config = RouterConfig {
            max_attempts_per_provider: 0, // clamped up to 1
            rate_limit_backoff_secs: 12,
            error_backoff_secs: 3,
            request_timeout_secs: 60,
            shuffle: false,
        };
        let policy = RouterPolicy::from(&config);
        assert_eq!(policy.max_attempts_per_provider, 1);
        assert_eq!(policy.rate_limit_backoff, Duration::from_secs(12));
        assert_eq!(policy.error_backoff, Duration::from_secs(3));
        assert!(!policy.shuffle);
    }
}

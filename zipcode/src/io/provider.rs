//! Capability provider abstraction for text completion.
//!
//! The [`CapabilityProvider`] trait decouples classification and planning from
//! the model backend (currently the OpenAI Responses API). Tests use scripted
//! providers that return predetermined text without network access.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ProviderError;

/// A text-completion capability.
///
/// One call, one answer: implementations do not retry. Retry policy is layered
/// by callers, see [`RetryingProvider`].
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
    -> Result<String, ProviderError>;
}

#[async_trait]
impl<P: CapabilityProvider + ?Sized> CapabilityProvider for Arc<P> {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        (**self).complete(system_prompt, user_prompt).await
    }
}

/// Backoff settings for [`RetryingProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Provider decorator that retries transport failures with exponential
/// backoff. Malformed responses are returned immediately.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: CapabilityProvider> CapabilityProvider for RetryingProvider<P> {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(system_prompt, user_prompt).await {
                Err(err) if err.is_transport() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying provider call"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn retries_transport_failures_until_success() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Transport("connection reset".to_string())),
            Err(ProviderError::Transport("503".to_string())),
            Ok("done".to_string()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), policy(2));
        let got = provider.complete("sys", "user").await;
        assert_eq!(got, Ok("done".to_string()));
        assert_eq!(inner.calls().len(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Transport("down".to_string())),
            Err(ProviderError::Transport("still down".to_string())),
        ]));
        let provider = RetryingProvider::new(inner.clone(), policy(1));
        let got = provider.complete("sys", "user").await;
        assert_eq!(got, Err(ProviderError::Transport("still down".to_string())));
        assert_eq!(inner.calls().len(), 2);
    }

    #[tokio::test]
    async fn does_not_retry_malformed_responses() {
        let inner = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Response(
            "no output".to_string(),
        ))]));
        let provider = RetryingProvider::new(inner.clone(), policy(3));
        assert!(provider.complete("sys", "user").await.is_err());
        assert_eq!(inner.calls().len(), 1);
    }
}

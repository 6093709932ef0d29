//! Bounded retries for calls to the generative-text service.
//!
//! Errors are classified by downcasting to [`ProviderError`]: permanent
//! failures (bad key, unknown model, other 4xx) stop immediately, everything
//! else backs off exponentially. Attempts and waits together are capped by
//! [`RetryPolicy::budget`]; an attempt still running when the budget runs
//! out is abandoned as a timeout.

use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use crate::error::{ProviderError, ScoringIssue};
use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider};

/// Retry and backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub initial_delay: Duration,
    /// Cap for a single delay, including provider retry-after hints.
    pub max_delay: Duration,
    /// Cap on total wall-clock time across all attempts and delays.
    pub budget: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            budget: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// No delays at all. For tests and offline tooling.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            budget: Duration::from_secs(3600),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Model parameters shared by every generative call in a run.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

impl AiSettings {
    pub fn request(&self, system_prompt: &str, prompt: String, json_response: bool) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            system_prompt: system_prompt.to_string(),
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            json_response,
        }
    }
}

/// Call the provider, retrying transient failures under `policy`.
///
/// Returns the last error once retries or the time budget run out.
pub async fn call_with_retry(
    provider: &dyn LlmProvider,
    request: &GenerateRequest,
    policy: &RetryPolicy,
) -> Result<GenerateResponse> {
    let start = Instant::now();
    let mut retry = 0;

    loop {
        let remaining = policy.budget.saturating_sub(start.elapsed());
        let err = match tokio::time::timeout(remaining, provider.generate(request)).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(err)) => err,
            Err(_) => ProviderError::Timeout(policy.budget.as_secs()).into(),
        };

        let classified = err.downcast_ref::<ProviderError>();
        if classified.is_some_and(ProviderError::is_permanent) {
            tracing::warn!(provider = provider.name(), "permanent provider error: {err:#}");
            return Err(err);
        }
        if retry >= policy.max_retries {
            return Err(err.context(format!("gave up after {} attempts", retry + 1)));
        }

        retry += 1;
        let hint = classified
            .and_then(ProviderError::retry_after_ms)
            .map(Duration::from_millis);
        let delay = policy.delay_for(retry, hint);
        if start.elapsed() + delay > policy.budget {
            return Err(err.context("retry budget exhausted"));
        }

        tracing::warn!(
            provider = provider.name(),
            retry,
            delay_ms = delay.as_millis() as u64,
            "transient provider error, retrying: {err:#}"
        );
        tokio::time::sleep(delay).await;
    }
}

/// One retried call on behalf of a pipeline task, returning the reply text.
///
/// Every failure, including a missing provider, becomes an
/// `AiServiceUnavailable` issue for `task`.
pub(crate) async fn complete(
    provider: Option<&dyn LlmProvider>,
    request: &GenerateRequest,
    policy: &RetryPolicy,
    task: &str,
) -> std::result::Result<String, ScoringIssue> {
    let Some(provider) = provider else {
        return Err(ScoringIssue::AiServiceUnavailable {
            task: task.to_string(),
            reason: "no generative service configured".to_string(),
        });
    };
    call_with_retry(provider, request, policy)
        .await
        .map(|response| response.content)
        .map_err(|err| ScoringIssue::AiServiceUnavailable {
            task: task.to_string(),
            reason: format!("{err:#}"),
        })
}

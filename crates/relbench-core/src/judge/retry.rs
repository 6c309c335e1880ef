use crate::context::RunContext;
use crate::model::{FailureClass, ProviderResult, RetryPolicy};
use std::future::Future;
use tokio::time::Duration;

/// Runs `call` up to `policy.attempts` times until it yields a score.
///
/// `call` never fails: timeouts and parse misses come back as a result with
/// `score == None`. Elapsed time is summed over every attempt, including the
/// failed ones. With retries disabled the provider is called exactly once.
pub async fn call_with_retry<F, Fut>(
    ctx: &RunContext,
    policy: &RetryPolicy,
    mut call: F,
) -> ProviderResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult>,
{
    let attempts = policy.attempts.max(1);
    let mut total_ms: u64 = 0;

    let mut attempt = 1;
    let mut last = loop {
        tracing::debug!(parent: ctx.span(), attempt, attempts, "provider call attempt");

        let result = call().await;
        total_ms = total_ms.saturating_add(result.elapsed_ms);

        let class = match result.classify() {
            None => {
                tracing::debug!(parent: ctx.span(), attempt, attempts, "provider call succeeded");
                return ProviderResult {
                    elapsed_ms: total_ms,
                    ..result
                };
            }
            Some(class) => class,
        };

        match class {
            FailureClass::Timeout => tracing::warn!(
                parent: ctx.span(),
                event = "provider_timeout",
                provider = %result.raw.provider,
                attempt,
                attempts,
                elapsed_ms = result.elapsed_ms,
                "provider call timed out"
            ),
            FailureClass::NoPrediction => tracing::warn!(
                parent: ctx.span(),
                event = "provider_no_prediction",
                provider = %result.raw.provider,
                attempt,
                attempts,
                error = ?result.raw.error,
                "provider call returned no prediction"
            ),
        }

        if !policy.enabled || attempt >= attempts {
            break result;
        }

        tracing::debug!(parent: ctx.span(), backoff_ms = policy.backoff_ms, "retrying");
        tokio::time::sleep(Duration::from_millis(policy.backoff_ms)).await;
        attempt += 1;
    };

    tracing::warn!(
        parent: ctx.span(),
        event = "provider_exhausted",
        attempts = attempt,
        "provider call failed on every attempt"
    );
    last.score = None;
    last.elapsed_ms = total_ms;
    last
}

//! Retry adapter around every graph source call.
//!
//! - Rate limited: sleep until the advertised reset, then call again. These
//!   waits do not consume the retry budget and only block the calling worker.
//! - Transient: retry up to `max_retries` times with a fixed backoff.
//! - Permanent: give up immediately.
//!
//! Every wait also watches the cancellation token.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use followscout_common::{CrawlSettings, SourceError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(60),
        }
    }
}

impl From<&CrawlSettings> for RetryPolicy {
    fn from(settings: &CrawlSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff: settings.retry_backoff(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: SourceError },

    #[error(transparent)]
    Permanent(SourceError),
}

/// Run `call` under the retry policy. `op` names the call in logs.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    op: &str,
    mut call: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut transient_failures = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            result = call() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(SourceError::RateLimited { reset_at }) => {
                let wait = (reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                warn!(
                    op,
                    %reset_at,
                    wait_secs = wait.as_secs(),
                    "Rate limit exceeded, waiting for window reset"
                );
                sleep_or_cancel(wait, cancel).await?;
            }
            Err(err @ SourceError::Transient(_)) => {
                transient_failures += 1;
                if transient_failures > policy.max_retries {
                    return Err(CallError::Exhausted {
                        attempts: transient_failures,
                        last: err,
                    });
                }
                warn!(
                    op,
                    error = %err,
                    attempt = transient_failures,
                    max_retries = policy.max_retries,
                    backoff_secs = policy.backoff.as_secs(),
                    "Transient error, backing off"
                );
                sleep_or_cancel(policy.backoff, cancel).await?;
            }
            Err(err @ SourceError::Permanent { .. }) => return Err(CallError::Permanent(err)),
        }
    }
}

async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> Result<(), CallError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CallError::Cancelled),
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}

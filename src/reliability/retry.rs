//! Backoff for idempotent calls to the telemetry server.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times, and how far apart, a failed call is repeated.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Three jittered retries starting at 100ms.
    #[must_use]
    pub fn network() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(20),
        }
    }

    /// Single attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::network()
        }
    }

    #[must_use]
    pub const fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_jitter()
    }
}

/// Run `call` until it succeeds, `retriable` rejects its error, or the
/// retries in `config` run out. The last error is returned.
pub async fn retry_async<F, Fut, T, E, R>(
    config: RetryConfig,
    call: F,
    retriable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut retry = 0u32;
    let max_retries = config.max_retries;
    call.retry(config.backoff())
        .when(move |e| retriable(e))
        .notify(|err: &E, delay: Duration| {
            retry += 1;
            warn!(
                retry,
                max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Telemetry request failed, retrying"
            );
        })
        .await
}

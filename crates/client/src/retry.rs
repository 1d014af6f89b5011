//! Bounded retry with backoff for chain submissions.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::{ClientError, ClientResult};

pub trait Backoff {
    /// Base delay in ms.
    fn base_delay_ms(&self) -> u64;

    /// Generates next delay given current delay.
    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64;
}

/// Exponential backoff with a fixed-point multiplier
/// (`multiplier / multiplier_base`), avoiding float math.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    multiplier: u64,
    multiplier_base: u64,
}

impl ExponentialBackoff {
    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert!(multiplier_base != 0);
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1500,
            multiplier: 15,
            multiplier_base: 10,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        curr_delay_ms * self.multiplier / self.multiplier_base
    }
}

/// Runs `operation` up to `1 + max_retries` times, sleeping between
/// attempts per `backoff`. Only transient errors are retried; every other
/// class returns immediately.
pub async fn retry_with_backoff<R, F, Fut>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    mut operation: F,
) -> ClientResult<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<R>>,
{
    let mut delay = backoff.base_delay_ms();

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                warn!(
                    %name,
                    attempt = attempt + 1,
                    ?err,
                    delay_ms = delay,
                    "transient failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = backoff.next_delay_ms(delay);
            }
            Err(err) => {
                if err.is_transient() {
                    error!(%name, "max retries exceeded, returning last error");
                }
                return Err(err);
            }
        }
    }

    unreachable!()
}

/// Wraps a controller call in a per-call timeout, mapping expiry to a
/// transient error.
pub async fn call_with_timeout<R>(
    name: &str,
    timeout: Duration,
    fut: impl Future<Output = ClientResult<R>>,
) -> ClientResult<R> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(ClientError::Transient(format!("{name}: rpc timed out"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::new(10, 2, 1);

        let res = retry_with_backoff("op", 5, &backoff, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(ClientError::Transient("nope".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::new(10, 2, 1);

        let res: ClientResult<()> = retry_with_backoff("op", 2, &backoff, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClientError::Transient("still down".into())) }
        })
        .await;

        assert!(matches!(res, Err(ClientError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::default();

        let res: ClientResult<()> = retry_with_backoff("op", 5, &backoff, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClientError::Rejected("bad sig".into())) }
        })
        .await;

        assert!(matches!(res, Err(ClientError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_with_timeout_maps_to_transient() {
        let res: ClientResult<()> = call_with_timeout("slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(ClientError::Transient(_))));
    }
}

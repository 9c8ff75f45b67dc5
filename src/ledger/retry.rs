use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Run a read call with bounded exponential backoff.
///
/// Only transient failures (rate limits, timeouts, connection resets) are
/// retried; anything else is returned to the caller on the first attempt.
pub async fn with_backoff<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = DEFAULT_BASE_DELAY;

    for attempt in 1..=DEFAULT_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < DEFAULT_ATTEMPTS => {
                debug!(
                    "{}: transient failure on attempt {}/{}: {} (retrying in {:?})",
                    label, attempt, DEFAULT_ATTEMPTS, e, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                }
                return Err(e);
            }
        }
    }

    unreachable!("backoff loop always returns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limit_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(WardenError::RateLimited("429".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hard_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: crate::error::Result<()> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(WardenError::NotEligible("nope".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

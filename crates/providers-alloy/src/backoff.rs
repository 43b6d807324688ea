//! Bounded exponential backoff with jitter for RPC calls.

use rand::Rng;
use std::{future::Future, time::Duration};
use tracing::warn;

/// Retry policy: exponential backoff with full jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Total attempts before giving up.
    pub max_tries: u32,
    /// The first delay.
    pub base: Duration,
    /// The delay ceiling.
    pub max_delay: Duration,
    /// The delay multiplier between attempts.
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_tries: 7,
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            multiplier: 2,
        }
    }
}

/// Runs `op` until it succeeds or the retry budget is spent.
///
/// Errors whose message contains `execution reverted` are returned
/// immediately: a revert is deterministic and retrying cannot help.
pub async fn retry_with_backoff<F, Fut, T, E>(cfg: BackoffConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = cfg.base;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let message = err.to_string();
                if message.contains("execution reverted") || attempt >= cfg.max_tries {
                    return Err(err);
                }
                let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
                let sleep_for = delay + Duration::from_millis(jitter);
                warn!(target: "backoff", attempt, %err, "retrying after {:?}", sleep_for);
                tokio::time::sleep(sleep_for).await;
                delay = (delay * cfg.multiplier).min(cfg.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> BackoffConfig {
        BackoffConfig {
            max_tries: 3,
            base: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2,
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(fast(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_with_backoff(fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still broken".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reverts_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_with_backoff(fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("execution reverted: nope".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

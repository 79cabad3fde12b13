//! Bounded retry with exponential backoff for transient upstream errors

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Run `operation` up to `max_attempts` times, retrying only transient
/// errors (`Error::Upstream`). Delay starts at 500ms and doubles, capped at
/// 30s. Non-transient errors propagate immediately.
pub async fn with_retries<T, F, Fut>(
    op_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = INITIAL_DELAY;
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(
                    operation = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test_op", 5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Upstream("503".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test_op", 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::NotFound("gone".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test_op", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Upstream("429".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(Error::Upstream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

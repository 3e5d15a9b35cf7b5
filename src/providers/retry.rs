use crate::error::{CinephileError, Result};
use std::time::Duration;
use tracing::warn;

/// Maximum backoff cap to prevent excessively long waits.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Transient failures worth another attempt: rate limits, server errors,
/// timeouts and dropped connections. Client errors are returned as-is.
fn is_retryable(err: &CinephileError) -> bool {
    match err {
        CinephileError::Http(e) => e.is_timeout() || e.is_connect(),
        CinephileError::ApiRequest(_) | CinephileError::Embedding(_) => {
            let msg = err.to_string().to_lowercase();

            let non_retryable = ["(400)", "(401)", "(403)", "(404)", "invalid", "unauthorized"];
            if non_retryable.iter().any(|p| msg.contains(p)) {
                return false;
            }

            let retryable = [
                "(429)",
                "(500)",
                "(502)",
                "(503)",
                "(504)",
                "timeout",
                "connection refused",
                "connection reset",
            ];
            retryable.iter().any(|p| msg.contains(p))
        }
        _ => false,
    }
}

/// Retry an async operation with exponential backoff.
///
/// Starts with `initial_delay` and doubles it each attempt, capping at 30 seconds.
/// `max_retries` of 0 runs the operation exactly once.
pub async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    initial_delay: Duration,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt == max_retries || !is_retryable(&err) {
                    return Err(err);
                }

                warn!(
                    attempt = attempt + 1,
                    max_attempts = max_retries + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
        }
    }
}

//! Retry logic with exponential backoff for outbound sends
//!
//! Sending messages and media is the only part of the pipeline that is
//! retried. Transient failures (rate limiting, dropped connections, timeouts)
//! back off exponentially with optional jitter; a rate limit response waits at
//! least as long as the service asked.
//!
//! # Example
//!
//! ```no_run
//! use archive_relay::retry::{IsRetryable, send_with_retry};
//! use archive_relay::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! send_with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransmissionError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Errors that can be classified as transient or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the remote side before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transmission(TransmissionError::RateLimited { .. })
            | Error::Transmission(TransmissionError::Transport { .. }) => true,
            // The service understood and refused; sending again changes nothing
            Error::Transmission(TransmissionError::Rejected { .. }) => false,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Download(_)
            | Error::Extraction(_)
            | Error::Probe(_)
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::Cancelled { .. }
            | Error::Timeout { .. }
            | Error::ShuttingDown
            | Error::NotSupported(_)
            | Error::Other(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Transmission(TransmissionError::RateLimited { retry_after }) => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

/// Execute an async send with exponential backoff retry logic
///
/// `config.max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times. Returns the first success or the last error.
pub async fn send_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "send succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                let backoff = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                let wait = match e.retry_after() {
                    Some(requested) => backoff.max(requested),
                    None => backoff,
                };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "send failed, retrying"
                );

                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "send failed after all retry attempts"
                    );
                } else {
                    tracing::debug!(error = %e, "send failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add up to 100% random jitter to a delay
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

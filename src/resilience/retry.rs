// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded retry with exponential backoff.
//!
//! Used for immediate deletes, where a miss usually means the document's
//! index call has not landed yet.
//!
//! # Example
//!
//! ```
//! use search_sync::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::unindex(3, 500);
//! assert_eq!(config.max_attempts, 3);
//! assert_eq!(config.initial_delay, Duration::from_millis(500));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first; at least 1
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::unindex(3, 500)
    }
}

impl RetryConfig {
    /// Fixed-delay policy for deletes racing an in-flight index call.
    #[must_use]
    pub fn unindex(attempts: usize, delay_ms: u64) -> Self {
        let delay = Duration::from_millis(delay_ms);
        Self {
            initial_delay: delay,
            max_delay: delay,
            factor: 1.0,
            max_attempts: attempts.max(1),
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            max_attempts: 3,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..retry {
            delay = delay.mul_f64(self.factor).min(self.max_delay);
        }
        delay
    }
}

/// Run `operation` until it succeeds or attempts run out; the last error is
/// returned on exhaustion.
pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_attempts {
                    return Err(err);
                }

                let delay = config.delay_for(attempts);
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max_attempts = config.max_attempts,
                    error = %err,
                    ?delay,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

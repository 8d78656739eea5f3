//! Explicit retry policy shared by login verification, chat activation and harvesting

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;
use crate::events::{EventObserver, ExtractionEvent};

/// "N attempts, backoff between them"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: delay,
            multiplier: 1,
            max_delay: delay,
        }
    }

    /// Delay doubles after every attempt, capped at `max_delay`
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            multiplier: 2,
            max_delay,
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// The closure receives the 1-based attempt number; the last error is returned.
    pub async fn retry<T, F, Fut>(
        &self,
        operation_name: &'static str,
        observer: &dyn EventObserver,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && !e.is_session_fatal() => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        operation_name, attempt, self.max_attempts, e
                    );
                    observer.on_event(ExtractionEvent::RetryScheduled {
                        operation: operation_name,
                        attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `operation` until `accept` approves its output; returns the last output when
    /// every attempt was rejected
    pub async fn retry_until<T, F, Fut, A>(
        &self,
        operation_name: &'static str,
        observer: &dyn EventObserver,
        accept: A,
        mut operation: F,
    ) -> T
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        A: Fn(&T) -> bool,
    {
        let mut attempt = 1;
        loop {
            let value = operation(attempt).await;
            if accept(&value) || attempt >= self.max_attempts {
                return value;
            }
            let delay = self.delay_after(attempt);
            observer.on_event(ExtractionEvent::RetryScheduled {
                operation: operation_name,
                attempt,
                delay,
            });
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

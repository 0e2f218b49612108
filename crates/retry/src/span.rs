//! Structured logging for retry loops
//!
//! Each call of the retry loop owns a [`RetrySpan`] that emits `tracing`
//! events for attempts, failures and the final outcome. Events carry the
//! operation name from [`RetryConfig::name`](crate::RetryConfig::name).

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{CancelReason, StopReason};

/// Log context for a single call of the retry loop
#[derive(Debug)]
pub struct RetrySpan {
    operation_name: String,
    max_attempts: u32,
}

impl RetrySpan {
    /// Start a span for `operation_name` (`max_attempts` 0 = unlimited)
    pub fn start(operation_name: &str, max_attempts: u32) -> Self {
        debug!(operation = operation_name, max_attempts, "Starting retry operation");

        Self { operation_name: operation_name.to_string(), max_attempts }
    }

    /// Name recorded on the span
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Global attempt ceiling recorded on the span (0 = unlimited)
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record the start of an attempt
    pub fn record_attempt(&self, attempt: u32, waited: Option<Duration>) {
        match waited {
            Some(delay) => debug!(
                operation = %self.operation_name,
                attempt,
                delay_ms = delay.as_millis(),
                "Retry attempt with delay"
            ),
            None => debug!(operation = %self.operation_name, attempt, "Retry attempt"),
        }
    }

    /// Record a failed attempt that will be retried after `delay`
    pub fn record_failure<E: fmt::Debug>(&self, attempt: u32, error: &E, delay: Duration) {
        warn!(
            operation = %self.operation_name,
            attempt,
            error = ?error,
            next_delay_ms = delay.as_millis(),
            "Retry attempt failed"
        );
    }

    /// Record success
    pub fn record_success(&self, attempts: u32, total_delay: Duration) {
        if attempts > 1 {
            info!(
                operation = %self.operation_name,
                attempts,
                total_delay_ms = total_delay.as_millis(),
                "Retry operation succeeded"
            );
        } else {
            debug!(operation = %self.operation_name, "Operation succeeded on first attempt");
        }
    }

    /// Record that the loop stopped without success
    pub fn record_stopped<E: fmt::Debug>(
        &self,
        reason: StopReason,
        attempts: u32,
        error: &E,
        total_delay: Duration,
    ) {
        warn!(
            operation = %self.operation_name,
            %reason,
            attempts,
            max_attempts = self.max_attempts,
            error = ?error,
            total_delay_ms = total_delay.as_millis(),
            "Retry operation stopped"
        );
    }

    /// Record cancellation or an expired deadline
    pub fn record_cancelled(&self, reason: CancelReason, attempts: u32, elapsed: Duration) {
        warn!(
            operation = %self.operation_name,
            %reason,
            attempts,
            elapsed_ms = elapsed.as_millis(),
            "Retry operation cancelled"
        );
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for retry logging.
    use super::*;

    #[test]
    fn test_span_creation() {
        let span = RetrySpan::start("fetch_profile", 3);
        assert_eq!(span.operation_name(), "fetch_profile");
        assert_eq!(span.max_attempts(), 3);
    }

    /// Validates that every event can be emitted with a subscriber installed.
    ///
    /// Assertion coverage: ensures the routine completes without panicking.
    #[test]
    fn test_span_recording() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let span = RetrySpan::start("fetch_profile", 3);
            span.record_attempt(1, None);
            span.record_failure(1, &"connection reset", Duration::from_millis(100));
            span.record_attempt(2, Some(Duration::from_millis(100)));
            span.record_success(2, Duration::from_millis(100));
            span.record_stopped(
                StopReason::AttemptsExhausted,
                3,
                &"connection reset",
                Duration::from_millis(300),
            );
            span.record_cancelled(CancelReason::Cancelled, 2, Duration::from_millis(5));
        });
    }
}

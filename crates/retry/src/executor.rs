//! The retry loop.
//!
//! Each call runs on the caller's task: attempts are strictly sequential and
//! nothing is spawned. Per-call state (attempt budget, error history,
//! deadline) lives in a `RetryLoop` that is created when the call starts and
//! consumed when it returns, so one [`RetryConfig`] can drive any number of
//! concurrent calls.

use std::fmt;
use std::future::{self, Future};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::budget::AttemptBudget;
use crate::classifier::{Classification, ErrorClassifier};
use crate::config::{AttemptRecord, RetryConfig, RetryConfigBuilder};
use crate::error::{
    AggregateError, CancelReason, OperationError, RetryError, RetryResult, StopReason,
};
use crate::history::ErrorHistory;
use crate::metrics::RetryMetrics;
use crate::span::RetrySpan;

/// Run `operation` under `config` until it succeeds or the loop stops.
///
/// Errors returned through `?` are retried; wrap an error with
/// [`unrecoverable`](crate::unrecoverable) to stop immediately.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig<E>, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError<E>>>,
    E: fmt::Debug,
{
    let mut metrics = RetryMetrics::new();
    run(config, operation, &mut metrics).await
}

/// Like [`retry`], but hands each attempt a cancellation token.
///
/// Every attempt gets a fresh child of the configured token (or a fresh
/// token when none is configured): the operation observes external
/// cancellation, but cancelling its own token neither stops the caller nor
/// leaks into later attempts.
pub async fn retry_with_cancellation<F, Fut, T, E>(
    config: &RetryConfig<E>,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, OperationError<E>>>,
    E: fmt::Debug,
{
    let parent = config.cancellation_token();
    retry(config, || {
        operation(parent.map_or_else(CancellationToken::new, CancellationToken::child_token))
    })
    .await
}

impl<E: fmt::Debug> RetryConfig<E> {
    /// Run `operation` under this configuration
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
    {
        retry(self, operation).await
    }

    /// Run a cancellation-aware `operation` under this configuration
    pub async fn execute_with_cancellation<F, Fut, T>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
    {
        retry_with_cancellation(self, operation).await
    }

    /// Run `operation` and report metrics for the call
    pub async fn execute_with_metrics<F, Fut, T>(
        &self,
        operation: F,
    ) -> (RetryResult<T, E>, RetryMetrics)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
    {
        let mut metrics = RetryMetrics::new();
        let result = run(self, operation, &mut metrics).await;
        (result, metrics)
    }
}

impl<E: fmt::Debug> RetryConfigBuilder<E> {
    /// Build the configuration and run `operation` under it.
    ///
    /// Validation failures are returned as [`RetryError::InvalidConfiguration`]
    /// without invoking the operation.
    pub async fn execute<F, Fut, T>(self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
    {
        let config = self.build()?;
        retry(&config, operation).await
    }
}

#[instrument(
    level = "debug",
    skip_all,
    fields(operation = %config.name(), max_attempts = config.attempts())
)]
async fn run<F, Fut, T, E>(
    config: &RetryConfig<E>,
    mut operation: F,
    metrics: &mut RetryMetrics,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OperationError<E>>>,
    E: fmt::Debug,
{
    let mut state = RetryLoop::new(config);
    let classifier = ErrorClassifier::new(config);
    let mut waited = None;

    loop {
        if let Some(reason) = state.interruption() {
            return Err(state.cancelled(reason, metrics));
        }

        let attempt = state.budget.begin_attempt();
        metrics.attempts = attempt;
        state.span.record_attempt(attempt, waited);

        let failure = match operation().await {
            Ok(value) => {
                metrics.succeeded = true;
                metrics.recorded_errors = state.history.len();
                state.span.record_success(attempt, metrics.total_delay);
                return Ok(value);
            }
            Err(failure) => failure,
        };

        let classification = classifier.classify(&failure);
        let error = failure.into_inner();

        let stop = match classification {
            Classification::Unrecoverable => Some(StopReason::Unrecoverable),
            Classification::Rejected => Some(StopReason::Rejected),
            Classification::Retryable { kind } => {
                state.budget.record(kind);
                state.budget.denial(attempt, kind)
            }
        };

        if let Some(reason) = stop {
            return Err(state.stopped(reason, attempt, error, metrics));
        }

        let delay = config.next_delay(attempt);
        if let Some(on_retry) = config.on_retry() {
            on_retry(&AttemptRecord { attempt, error: &error, next_delay: delay });
        }
        state.span.record_failure(attempt, &error, delay);
        state.history.record(error);

        let wait_started = Instant::now();
        let outcome = state.wait(delay).await;
        let elapsed = wait_started.elapsed();
        metrics.total_delay = metrics.total_delay.saturating_add(elapsed);

        if let Err(reason) = outcome {
            return Err(state.cancelled(reason, metrics));
        }
        waited = Some(elapsed);
    }
}

/// Mutable state of one call of the retry loop
struct RetryLoop<'a, E> {
    config: &'a RetryConfig<E>,
    span: RetrySpan,
    budget: AttemptBudget,
    history: ErrorHistory<E>,
    started: Instant,
    /// Deadline and the timeout it was derived from
    deadline: Option<(Instant, Duration)>,
}

impl<'a, E: fmt::Debug> RetryLoop<'a, E> {
    fn new(config: &'a RetryConfig<E>) -> Self {
        let started = Instant::now();
        // A timeout too large to represent never expires.
        let deadline = config
            .timeout()
            .and_then(|timeout| started.checked_add(timeout).map(|deadline| (deadline, timeout)));
        let history = if config.last_error_only() {
            ErrorHistory::last_error_only()
        } else {
            ErrorHistory::new()
        };

        Self {
            config,
            span: RetrySpan::start(config.name(), config.attempts()),
            budget: AttemptBudget::for_config(config),
            history,
            started,
            deadline,
        }
    }

    /// Cancellation or deadline that forbids starting another attempt
    fn interruption(&self) -> Option<CancelReason> {
        if self.config.cancellation_token().is_some_and(CancellationToken::is_cancelled) {
            return Some(CancelReason::Cancelled);
        }

        match self.deadline {
            Some((deadline, timeout)) if Instant::now() >= deadline => {
                Some(CancelReason::DeadlineExceeded { timeout })
            }
            _ => None,
        }
    }

    /// Sleep for `delay`, returning early if cancellation fires or the
    /// deadline passes
    async fn wait(&self, delay: Duration) -> Result<(), CancelReason> {
        let cancelled = async {
            match self.config.cancellation_token() {
                Some(token) => token.cancelled().await,
                None => future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some((deadline, timeout)) => {
                    time::sleep_until(deadline).await;
                    timeout
                }
                None => future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(CancelReason::Cancelled),
            timeout = expired => Err(CancelReason::DeadlineExceeded { timeout }),
            () = time::sleep(delay) => Ok(()),
        }
    }

    fn stopped(
        mut self,
        reason: StopReason,
        attempt: u32,
        error: E,
        metrics: &mut RetryMetrics,
    ) -> RetryError<E> {
        self.span.record_stopped(reason, attempt, &error, metrics.total_delay);
        self.history.record(error);
        metrics.recorded_errors = self.history.len();
        RetryError::Exhausted(AggregateError::new(reason, attempt, self.history))
    }

    fn cancelled(self, reason: CancelReason, metrics: &mut RetryMetrics) -> RetryError<E> {
        let attempts = self.budget.attempts();
        self.span.record_cancelled(reason, attempts, self.started.elapsed());
        metrics.cancelled = true;
        metrics.recorded_errors = self.history.len();

        let last_error =
            if self.config.wrap_cancellation_error() { self.history.into_last() } else { None };
        RetryError::Cancelled { reason, attempts, last_error }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the retry loop
    //!
    //! These run with a paused tokio clock, so backoff delays elapse
    //! instantly while their ordering is preserved.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::unrecoverable;
    use crate::strategy::DelayStrategy;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Unavailable,
        Fatal,
    }

    fn fail<T>(err: TestError) -> Result<T, OperationError<TestError>> {
        Err(OperationError::Transient(err))
    }

    fn fixed(attempts: u32, delay_ms: u64) -> RetryConfigBuilder<TestError> {
        RetryConfig::builder()
            .attempts(attempts)
            .delay(Duration::from_millis(delay_ms))
            .delay_strategy(DelayStrategy::Fixed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let config = fixed(3, 10).build().unwrap();
        let (result, metrics) =
            config.execute_with_metrics(|| async { Ok::<_, OperationError<TestError>>(7) }).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(metrics.attempts, 1);
        assert!(metrics.succeeded);
        assert_eq!(metrics.total_delay, Duration::ZERO);
    }

    /// Validates that waits follow the configured strategy.
    #[tokio::test(start_paused = true)]
    async fn test_waits_follow_strategy() {
        let config = RetryConfig::builder()
            .attempts(4)
            .delay(Duration::from_millis(100))
            .delay_strategy(DelayStrategy::Exponential)
            .build()
            .unwrap();
        let started = Instant::now();

        let (result, metrics) = config
            .execute_with_metrics(|| async { fail::<()>(TestError::Unavailable) })
            .await;

        assert!(result.is_err());
        assert_eq!(metrics.attempts, 4);
        // 100 + 200 + 400 ms; no wait after the last attempt.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(720), "{elapsed:?}");
        assert!(metrics.total_delay >= Duration::from_millis(700));
        assert_eq!(metrics.recorded_errors, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_sees_next_delay() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let config = fixed(3, 25)
            .on_retry(move |record| {
                recorder.lock().unwrap().push((record.attempt, record.next_delay));
            })
            .build()
            .unwrap();

        let result = config.execute(|| async { fail::<()>(TestError::Unavailable) }).await;

        assert!(result.is_err());
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(1, Duration::from_millis(25)), (2, Duration::from_millis(25))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_reason() {
        let calls = AtomicU32::new(0);
        let config = fixed(5, 1).build().unwrap();

        let err = config
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unrecoverable(TestError::Fatal))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let aggregate = err.aggregate().unwrap();
        assert_eq!(aggregate.reason(), StopReason::Unrecoverable);
        assert_eq!(aggregate.errors(), &[TestError::Fatal]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let config = fixed(5, 1).cancellation(token).build().unwrap();

        let (result, metrics) = config
            .execute_with_metrics(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OperationError<TestError>>(())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result,
            Err(RetryError::Cancelled { reason: CancelReason::Cancelled, attempts: 0, .. })
        ));
        assert!(metrics.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_receives_child_token() {
        let parent = CancellationToken::new();
        let config = fixed(2, 1).cancellation(parent.clone()).build().unwrap();

        let result = config
            .execute_with_cancellation(|token| async move {
                token.cancel();
                Ok::<_, OperationError<TestError>>(())
            })
            .await;

        assert!(result.is_ok());
        assert!(!parent.is_cancelled());
    }

    /// A token cancelled by one attempt must not leak into the next.
    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_gets_fresh_token() {
        let parent = CancellationToken::new();
        let configs = [
            fixed(3, 1).build().unwrap(),
            fixed(3, 1).cancellation(parent.clone()).build().unwrap(),
        ];

        for config in configs {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = Arc::clone(&seen);

            let result = config
                .execute_with_cancellation(move |token| {
                    let seen = Arc::clone(&seen_clone);
                    async move {
                        seen.lock().unwrap().push(token.is_cancelled());
                        token.cancel();
                        fail::<()>(TestError::Unavailable)
                    }
                })
                .await;

            assert!(matches!(result, Err(RetryError::Exhausted(_))));
            assert_eq!(*seen.lock().unwrap(), vec![false, false, false]);
            assert!(!parent.is_cancelled());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_builder_execute_reports_invalid_configuration() {
        let calls = AtomicU32::new(0);
        let result = fixed(3, 100)
            .max_delay(Duration::from_millis(10))
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, OperationError<TestError>>(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::InvalidConfiguration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

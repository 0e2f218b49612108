//! Retry configuration and its fluent builder.
//!
//! A [`RetryConfig`] is assembled once from the documented defaults plus an
//! ordered sequence of builder calls. Later calls override earlier ones, except
//! per-error-kind ceilings which accumulate in registration order. The built
//! configuration is immutable and cheap to clone; every call to the retry loop
//! derives its own attempt budget and error history from it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::constants::{DEFAULT_ATTEMPTS, UNLIMITED_ATTEMPTS};
use crate::error::ConfigError;
use crate::strategy::{DelayFn, DelaySettings, DelayStrategy};

/// Predicate over an operation error
pub type ErrorPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Callback observing each failed attempt that will be retried
pub type OnRetryFn<E> = Arc<dyn Fn(&AttemptRecord<'_, E>) + Send + Sync>;

const DEFAULT_OPERATION_NAME: &str = "retry";

/// A failed attempt, as seen by the on-retry callback
#[derive(Debug)]
pub struct AttemptRecord<'a, E> {
    /// 1-based attempt index
    pub attempt: u32,
    /// Error produced by this attempt
    pub error: &'a E,
    /// Wait before the next attempt
    pub next_delay: Duration,
}

/// A per-error-kind attempt ceiling
pub(crate) struct KindCeiling<E> {
    pub(crate) matches: ErrorPredicate<E>,
    pub(crate) ceiling: u32,
}

impl<E> Clone for KindCeiling<E> {
    fn clone(&self) -> Self {
        Self { matches: Arc::clone(&self.matches), ceiling: self.ceiling }
    }
}

/// Immutable, validated retry policy
pub struct RetryConfig<E> {
    name: String,
    attempts: u32,
    kind_ceilings: Vec<KindCeiling<E>>,
    strategy: DelayStrategy,
    delay: DelaySettings,
    retry_if: Option<ErrorPredicate<E>>,
    on_retry: Option<OnRetryFn<E>>,
    cancellation: Option<CancellationToken>,
    timeout: Option<Duration>,
    wrap_cancellation_error: bool,
    last_error_only: bool,
}

impl<E> Default for RetryConfig<E> {
    fn default() -> Self {
        Self {
            name: DEFAULT_OPERATION_NAME.to_string(),
            attempts: DEFAULT_ATTEMPTS,
            kind_ceilings: Vec::new(),
            strategy: DelayStrategy::default(),
            delay: DelaySettings::default(),
            retry_if: None,
            on_retry: None,
            cancellation: None,
            timeout: None,
            wrap_cancellation_error: false,
            last_error_only: false,
        }
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            attempts: self.attempts,
            kind_ceilings: self.kind_ceilings.clone(),
            strategy: self.strategy,
            delay: self.delay.clone(),
            retry_if: self.retry_if.clone(),
            on_retry: self.on_retry.clone(),
            cancellation: self.cancellation.clone(),
            timeout: self.timeout,
            wrap_cancellation_error: self.wrap_cancellation_error,
            last_error_only: self.last_error_only,
        }
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("name", &self.name)
            .field("attempts", &self.attempts)
            .field("kind_ceilings", &self.kind_ceilings())
            .field("strategy", &self.strategy)
            .field("delay", &self.delay)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<function>"))
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<function>"))
            .field("cancellation", &self.cancellation)
            .field("timeout", &self.timeout)
            .field("wrap_cancellation_error", &self.wrap_cancellation_error)
            .field("last_error_only", &self.last_error_only)
            .finish()
    }
}

impl<E> RetryConfig<E> {
    /// Create a builder starting from the defaults
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    /// Create a builder seeded with this configuration, for per-call overrides
    pub fn to_builder(&self) -> RetryConfigBuilder<E> {
        RetryConfigBuilder { config: self.clone() }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delay.max_delay.is_zero() && self.delay.max_delay < self.delay.delay {
            return Err(ConfigError::MaxDelayBelowDelay {
                delay: self.delay.delay,
                max_delay: self.delay.max_delay,
            });
        }

        if self.strategy == DelayStrategy::Custom && self.delay.custom.is_none() {
            return Err(ConfigError::MissingCustomDelay);
        }

        Ok(())
    }

    /// Label used in log records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Global attempt ceiling (0 = unlimited)
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the global ceiling is unlimited
    pub fn is_unlimited(&self) -> bool {
        self.attempts == UNLIMITED_ATTEMPTS
    }

    /// Per-error-kind ceilings in registration order
    pub fn kind_ceilings(&self) -> Vec<u32> {
        self.kind_ceilings.iter().map(|rule| rule.ceiling).collect()
    }

    pub(crate) fn kind_rules(&self) -> &[KindCeiling<E>] {
        &self.kind_ceilings
    }

    /// Selected delay strategy
    pub fn strategy(&self) -> DelayStrategy {
        self.strategy
    }

    /// Parameters fed to the delay strategy
    pub fn delay_settings(&self) -> &DelaySettings {
        &self.delay
    }

    /// Delay to wait after `attempt` failed
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.strategy.delay(attempt, &self.delay)
    }

    pub(crate) fn retry_if(&self) -> Option<&ErrorPredicate<E>> {
        self.retry_if.as_ref()
    }

    pub(crate) fn on_retry(&self) -> Option<&OnRetryFn<E>> {
        self.on_retry.as_ref()
    }

    /// External cancellation handle, if any
    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Overall deadline measured from the start of each call
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether cancellation errors carry the last operation error
    pub fn wrap_cancellation_error(&self) -> bool {
        self.wrap_cancellation_error
    }

    /// Whether only the most recent error is kept
    pub fn last_error_only(&self) -> bool {
        self.last_error_only
    }
}

/// Builder for [`RetryConfig`] with fluent API
pub struct RetryConfigBuilder<E> {
    config: RetryConfig<E>,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RetryConfigBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfigBuilder").field("config", &self.config).finish()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Start from the default policy
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Label used in log records
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Cap total invocations; 0 means unlimited
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.config.attempts = attempts;
        self
    }

    /// Retry until the operation succeeds, is cancelled, or fails unrecoverably
    pub fn until_succeeded(mut self) -> Self {
        self.config.attempts = UNLIMITED_ATTEMPTS;
        self
    }

    /// Ceiling for errors matching `matches`; 0 stops on the first match.
    ///
    /// Rules accumulate and are evaluated in registration order, first match
    /// wins.
    pub fn attempts_for_error<P>(mut self, matches: P, ceiling: u32) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.config.kind_ceilings.push(KindCeiling { matches: Arc::new(matches), ceiling });
        self
    }

    /// Ceiling for errors equal to `target`
    pub fn attempts_for(self, target: E, ceiling: u32) -> Self
    where
        E: PartialEq + Send + Sync + 'static,
    {
        self.attempts_for_error(move |err: &E| *err == target, ceiling)
    }

    /// Base delay for the backoff computation
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay.delay = delay;
        self
    }

    /// Upper bound for any computed delay; zero removes the cap
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.delay.max_delay = max_delay;
        self
    }

    /// Select how waits grow between attempts
    pub fn delay_strategy(mut self, strategy: DelayStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Lower bound for the random-jitter strategy
    pub fn jitter_floor(mut self, floor: Duration) -> Self {
        self.config.delay.jitter_floor = floor;
        self
    }

    /// Use a caller-supplied delay function (selects [`DelayStrategy::Custom`])
    pub fn custom_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(u32, &DelaySettings) -> Duration + Send + Sync + 'static,
    {
        let delay: DelayFn = Arc::new(delay);
        self.config.delay.custom = Some(delay);
        self.config.strategy = DelayStrategy::Custom;
        self
    }

    /// Only retry errors accepted by `predicate`
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.config.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Observe each failed attempt before the wait that precedes the next one
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AttemptRecord<'_, E>) + Send + Sync + 'static,
    {
        self.config.on_retry = Some(Arc::new(callback));
        self
    }

    /// External cancellation source, checked before each attempt and raced
    /// against each wait
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    /// Overall deadline for a call, measured from its start
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Report the last operation error together with the cancellation reason
    pub fn wrap_cancellation_error(mut self, wrap: bool) -> Self {
        self.config.wrap_cancellation_error = wrap;
        self
    }

    /// Keep only the most recent error instead of the full history
    pub fn last_error_only(mut self, last_only: bool) -> Self {
        self.config.last_error_only = last_only;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<RetryConfig<E>, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

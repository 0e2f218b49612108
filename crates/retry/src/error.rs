// Error types for the retry engine
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::history::ErrorHistory;

/// Failure returned by a single invocation of a retried operation.
///
/// `?` inside an operation converts any `E` into [`OperationError::Transient`],
/// so failures are retryable unless explicitly wrapped with [`unrecoverable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError<E> {
    /// Retryable failure (default classification)
    #[error(transparent)]
    Transient(E),

    /// Failure that stops the retry loop regardless of remaining attempts
    #[error("unrecoverable error: {0}")]
    Unrecoverable(#[source] E),
}

impl<E> OperationError<E> {
    /// Whether this failure carries the unrecoverable marker
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }

    /// Borrow the original error
    pub fn get_ref(&self) -> &E {
        match self {
            Self::Transient(err) | Self::Unrecoverable(err) => err,
        }
    }

    /// Recover the original error, dropping the marker
    pub fn into_inner(self) -> E {
        match self {
            Self::Transient(err) | Self::Unrecoverable(err) => err,
        }
    }
}

impl<E> From<E> for OperationError<E> {
    fn from(err: E) -> Self {
        Self::Transient(err)
    }
}

/// Mark an error as unrecoverable so the retry loop stops immediately
pub fn unrecoverable<E>(err: E) -> OperationError<E> {
    OperationError::Unrecoverable(err)
}

/// Invalid retry configuration, reported before any attempt is made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_delay ({max_delay:?}) cannot be less than delay ({delay:?})")]
    MaxDelayBelowDelay {
        /// Configured base delay
        delay: Duration,
        /// Configured cap, shorter than the base delay
        max_delay: Duration,
    },

    #[error("custom delay strategy selected but no delay function was supplied")]
    MissingCustomDelay,
}

/// Why the loop stopped invoking the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The global attempt ceiling was reached
    AttemptsExhausted,
    /// A per-error-kind ceiling was reached for the last error
    KindAttemptsExhausted,
    /// The last error carried the unrecoverable marker
    Unrecoverable,
    /// The custom retry predicate rejected the last error
    Rejected,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AttemptsExhausted => "attempts exhausted",
            Self::KindAttemptsExhausted => "attempts for error kind exhausted",
            Self::Unrecoverable => "unrecoverable error",
            Self::Rejected => "error not retryable",
        };
        f.write_str(text)
    }
}

/// Why the loop was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancelReason {
    #[error("cancellation requested")]
    Cancelled,

    #[error("deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },
}

/// Errors recorded by a terminated retry loop
#[derive(Debug, Clone)]
pub struct AggregateError<E> {
    reason: StopReason,
    attempts: u32,
    history: ErrorHistory<E>,
}

impl<E> AggregateError<E> {
    pub(crate) fn new(reason: StopReason, attempts: u32, history: ErrorHistory<E>) -> Self {
        Self { reason, attempts, history }
    }

    /// Why the loop stopped
    pub fn reason(&self) -> StopReason {
        self.reason
    }

    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Recorded errors in attempt order (bounded by the history cap)
    pub fn errors(&self) -> &[E] {
        self.history.as_slice()
    }

    /// Iterate over the recorded errors
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.history.iter()
    }

    /// Number of recorded errors
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no errors were recorded
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Number of errors that occurred but were not recorded
    pub fn dropped(&self) -> usize {
        self.history.dropped()
    }

    /// The error produced by the final attempt
    pub fn last(&self) -> Option<&E> {
        self.history.last()
    }

    /// Consume the aggregate and return the final attempt's error
    pub fn into_last(self) -> Option<E> {
        self.history.into_last()
    }

    /// Borrow the underlying history
    pub fn history(&self) -> &ErrorHistory<E> {
        &self.history
    }

    /// Consume the aggregate and return the recorded errors
    pub fn into_errors(self) -> Vec<E> {
        self.history.into_vec()
    }

    /// Whether any recorded error satisfies the predicate
    pub fn any<P>(&self, mut predicate: P) -> bool
    where
        P: FnMut(&E) -> bool,
    {
        self.iter().any(|err| predicate(err))
    }

    /// Whether an error equal to `target` was recorded
    pub fn contains(&self, target: &E) -> bool
    where
        E: PartialEq,
    {
        self.iter().any(|err| err == target)
    }
}

impl<E> AggregateError<E>
where
    E: StdError + 'static,
{
    /// Find the first value of type `T` among the recorded errors and their
    /// `source()` chains
    pub fn find_cause<T>(&self) -> Option<&T>
    where
        T: StdError + 'static,
    {
        self.iter().find_map(|err| {
            let mut current: Option<&(dyn StdError + 'static)> = Some(err);
            while let Some(candidate) = current {
                if let Some(found) = candidate.downcast_ref::<T>() {
                    return Some(found);
                }
                current = candidate.source();
            }
            None
        })
    }
}

impl<'a, E> IntoIterator for &'a AggregateError<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.history.is_last_error_only() {
            return match self.history.last() {
                Some(err) => write!(f, "{err}"),
                None => write!(f, "{} after {} attempts", self.reason, self.attempts),
            };
        }

        write!(f, "{} after {} attempts:", self.reason, self.attempts)?;
        for (index, err) in self.history.iter().enumerate() {
            write!(f, "\n#{}: {err}", index + 1)?;
        }
        if self.history.dropped() > 0 {
            write!(f, "\n({} more errors not recorded)", self.history.dropped())?;
        }
        Ok(())
    }
}

impl<E> StdError for AggregateError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.last().map(|err| err as &(dyn StdError + 'static))
    }
}

/// Errors returned by the retry engine
///
/// A cancelled loop reports the cancellation cause in its message; under the
/// wrap option the last operation error follows as its [`source`].
///
/// [`source`]: std::error::Error::source
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The configuration was rejected before the first attempt
    #[error("invalid retry configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// The loop stopped after one or more failed attempts
    #[error(transparent)]
    Exhausted(AggregateError<E>),

    /// The cancellation handle fired or the deadline passed
    #[error("retry cancelled after {attempts} attempts: {reason}")]
    Cancelled {
        /// Whether the handle fired or the deadline passed
        reason: CancelReason,
        /// Number of times the operation was invoked before cancellation
        attempts: u32,
        /// Last operation error, kept only when wrapping is enabled
        #[source]
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidConfiguration(_) => 0,
            Self::Exhausted(aggregate) => aggregate.attempts(),
            Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The aggregate of recorded errors, if the loop ran out of options
    pub fn aggregate(&self) -> Option<&AggregateError<E>> {
        match self {
            Self::Exhausted(aggregate) => Some(aggregate),
            _ => None,
        }
    }

    /// The most recent operation error carried by this error
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::InvalidConfiguration(_) => None,
            Self::Exhausted(aggregate) => aggregate.last(),
            Self::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Consume and return the most recent operation error
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::InvalidConfiguration(_) => None,
            Self::Exhausted(aggregate) => aggregate.into_last(),
            Self::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Whether the loop ended because of cancellation or a deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

// Classification of operation failures
use crate::config::RetryConfig;
use crate::error::OperationError;

/// How a single failure is treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The failure carries the unrecoverable marker
    Unrecoverable,
    /// The custom retry predicate rejected the failure
    Rejected,
    /// The failure may be retried, subject to the attempt budget.
    ///
    /// `kind` is the index of the first per-error-kind ceiling whose matcher
    /// accepted the error, if any.
    Retryable { kind: Option<usize> },
}

/// Classifies failures against a [`RetryConfig`]
pub struct ErrorClassifier<'a, E> {
    config: &'a RetryConfig<E>,
}

impl<'a, E> ErrorClassifier<'a, E> {
    /// Classifier over the ceilings and predicate of `config`
    pub fn new(config: &'a RetryConfig<E>) -> Self {
        Self { config }
    }

    /// Classify a failure.
    ///
    /// The unrecoverable marker wins over everything else. Otherwise the
    /// error is matched against the per-kind ceilings (first match wins) and
    /// then offered to the retry predicate, which defaults to accepting every
    /// error.
    pub fn classify(&self, failure: &OperationError<E>) -> Classification {
        let error = match failure {
            OperationError::Unrecoverable(_) => return Classification::Unrecoverable,
            OperationError::Transient(error) => error,
        };

        let kind = self.kind_of(error);

        let accepted = self.config.retry_if().map_or(true, |predicate| predicate(error));
        if !accepted {
            return Classification::Rejected;
        }

        Classification::Retryable { kind }
    }

    /// Index of the first per-kind ceiling matching `error`
    pub fn kind_of(&self, error: &E) -> Option<usize> {
        self.config.kind_rules().iter().position(|rule| (rule.matches)(error))
    }
}

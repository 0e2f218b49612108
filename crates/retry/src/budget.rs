// Attempt budget for a single retry loop
use crate::config::RetryConfig;
use crate::constants::UNLIMITED_ATTEMPTS;
use crate::error::StopReason;

/// Tracks attempts against the global ceiling and the per-error-kind ceilings.
///
/// A budget belongs to exactly one call of the retry loop; counters start at
/// zero and are never shared between calls.
#[derive(Debug, Clone)]
pub struct AttemptBudget {
    /// Global attempt ceiling (0 = unlimited)
    max_attempts: u32,
    /// Ceiling per registered error kind
    kind_ceilings: Vec<u32>,
    /// Occurrences seen per registered error kind
    kind_counts: Vec<u32>,
    /// Attempts started so far
    attempts: u32,
}

impl AttemptBudget {
    /// Create a budget with the given global and per-kind ceilings
    pub fn new(max_attempts: u32, kind_ceilings: Vec<u32>) -> Self {
        let kind_counts = vec![0; kind_ceilings.len()];
        Self { max_attempts, kind_ceilings, kind_counts, attempts: 0 }
    }

    /// Create a fresh budget for one call under `config`
    pub fn for_config<E>(config: &RetryConfig<E>) -> Self {
        Self::new(config.attempts(), config.kind_ceilings())
    }

    /// Start a new attempt and return its 1-based index
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the global ceiling is unlimited
    pub fn is_unlimited(&self) -> bool {
        self.max_attempts == UNLIMITED_ATTEMPTS
    }

    /// Count one occurrence of the error kind at `kind`
    pub fn record(&mut self, kind: Option<usize>) {
        if let Some(count) = kind.and_then(|index| self.kind_counts.get_mut(index)) {
            *count = count.saturating_add(1);
        }
    }

    /// Occurrences counted for the error kind at `kind`
    pub fn kind_count(&self, kind: usize) -> u32 {
        self.kind_counts.get(kind).copied().unwrap_or(0)
    }

    /// Whether another attempt may follow failed attempt `attempt` whose
    /// error matched `kind`
    pub fn permits(&self, attempt: u32, kind: Option<usize>) -> bool {
        self.denial(attempt, kind).is_none()
    }

    /// The ceiling that forbids another attempt, if any.
    ///
    /// A matching per-kind ceiling is checked before the global one; with a
    /// ceiling of 0 the first occurrence already exhausts it.
    pub fn denial(&self, attempt: u32, kind: Option<usize>) -> Option<StopReason> {
        if let Some(index) = kind {
            if let (Some(&ceiling), Some(&count)) =
                (self.kind_ceilings.get(index), self.kind_counts.get(index))
            {
                if count >= ceiling {
                    return Some(StopReason::KindAttemptsExhausted);
                }
            }
        }

        if !self.is_unlimited() && attempt >= self.max_attempts {
            return Some(StopReason::AttemptsExhausted);
        }

        None
    }
}

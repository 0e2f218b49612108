// Metrics for retry operations
use std::fmt;
use std::time::Duration;

/// Metrics collected during one call of the retry loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryMetrics {
    /// Number of attempts made
    pub attempts: u32,
    /// Total time spent waiting between attempts
    pub total_delay: Duration,
    /// Errors recorded in the history
    pub recorded_errors: usize,
    /// Whether the operation ultimately succeeded
    pub succeeded: bool,
    /// Whether the loop ended through cancellation or its deadline
    pub cancelled: bool,
}

impl RetryMetrics {
    /// Empty metrics for a call that has not started
    pub fn new() -> Self {
        Self::default()
    }

    /// Average wait between attempts
    pub fn average_delay(&self) -> Option<Duration> {
        if self.attempts <= 1 {
            None
        } else {
            Some(self.total_delay / (self.attempts - 1))
        }
    }

    /// Number of retries, i.e. attempts after the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl fmt::Display for RetryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryMetrics {{ attempts: {}, total_delay: {:?}, recorded_errors: {}, succeeded: {}, \
             cancelled: {} }}",
            self.attempts, self.total_delay, self.recorded_errors, self.succeeded, self.cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_delay() {
        let metrics = RetryMetrics {
            attempts: 3,
            total_delay: Duration::from_millis(300),
            ..RetryMetrics::default()
        };
        assert_eq!(metrics.average_delay(), Some(Duration::from_millis(150)));
        assert_eq!(metrics.retries(), 2);

        let single = RetryMetrics { attempts: 1, ..RetryMetrics::default() };
        assert_eq!(single.average_delay(), None);
        assert_eq!(RetryMetrics::new().retries(), 0);
    }

    #[test]
    fn test_display() {
        let metrics = RetryMetrics { attempts: 2, succeeded: true, ..RetryMetrics::default() };
        let text = metrics.to_string();
        assert!(text.contains("attempts: 2"));
        assert!(text.contains("succeeded: true"));
        assert!(text.contains("cancelled: false"));
    }
}

// Constants for the retry engine
use std::time::Duration;

/// Default global attempt ceiling
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Default base delay between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Default max delay cap (zero = uncapped)
pub const DEFAULT_MAX_DELAY: Duration = Duration::ZERO;

/// Default lower bound for the random-jitter strategy
pub const DEFAULT_JITTER_FLOOR: Duration = Duration::from_millis(1);

/// Maximum number of operation errors kept in the error history
pub const MAX_ERROR_HISTORY: usize = 1000;

/// Maximum exponent for exponential backoff calculation to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 62;

/// Attempt ceiling value meaning "no limit"
pub const UNLIMITED_ATTEMPTS: u32 = 0;

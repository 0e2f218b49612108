//! Data-only retry settings for configuration files
//!
//! [`RetrySettings`] carries the subset of a retry policy that can be written
//! down as data: ceilings, delays, strategy and flags. Durations are expressed
//! in milliseconds. Predicates, callbacks and cancellation tokens are attached
//! afterwards on the builder returned by [`RetrySettings::into_builder`].
//!
//! ```toml
//! attempts = 5
//! delay = 250
//! max_delay = 10000
//! strategy = "full_jitter"
//! timeout = 30000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RetryConfigBuilder;
use crate::constants::{DEFAULT_ATTEMPTS, DEFAULT_DELAY, DEFAULT_JITTER_FLOOR, DEFAULT_MAX_DELAY};
use crate::strategy::DelayStrategy;

/// Serializable retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Label used in log records
    pub name: Option<String>,
    /// Global attempt ceiling (0 = unlimited)
    pub attempts: u32,
    /// Base delay in milliseconds
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Delay cap in milliseconds (0 = uncapped)
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub strategy: DelayStrategy,
    /// Random-jitter floor in milliseconds
    #[serde(with = "duration_millis")]
    pub jitter_floor: Duration,
    /// Overall deadline in milliseconds
    #[serde(with = "duration_millis::option")]
    pub timeout: Option<Duration>,
    pub wrap_cancellation_error: bool,
    pub last_error_only: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            name: None,
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            strategy: DelayStrategy::default(),
            jitter_floor: DEFAULT_JITTER_FLOOR,
            timeout: None,
            wrap_cancellation_error: false,
            last_error_only: false,
        }
    }
}

impl RetrySettings {
    /// Turn the settings into a builder; validation happens on `build()`
    pub fn into_builder<E>(self) -> RetryConfigBuilder<E> {
        let mut builder = RetryConfigBuilder::new()
            .attempts(self.attempts)
            .delay(self.delay)
            .max_delay(self.max_delay)
            .delay_strategy(self.strategy)
            .jitter_floor(self.jitter_floor)
            .wrap_cancellation_error(self.wrap_cancellation_error)
            .last_error_only(self.last_error_only);

        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

impl<E> From<RetrySettings> for RetryConfigBuilder<E> {
    fn from(settings: RetrySettings) -> Self {
        settings.into_builder()
    }
}

/// Serde helpers for `Duration` as milliseconds (u64)
pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    fn to_millis(duration: &Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Write the duration as whole milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(to_millis(duration))
    }

    /// Read a millisecond count
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }

    /// Same encoding for `Option<Duration>`
    pub mod option {
        use super::*;

        /// Write the duration as milliseconds, or nothing when absent
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
        where
            S: Serializer,
        {
            match duration {
                Some(duration) => serializer.serialize_some(&to_millis(duration)),
                None => serializer.serialize_none(),
            }
        }

        /// Read an optional millisecond count
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = Option::<u64>::deserialize(deserializer)?;
            Ok(millis.map(Duration::from_millis))
        }
    }
}

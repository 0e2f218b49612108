//! Async retry engine for fallible operations.
//!
//! A [`RetryConfig`] describes how often an operation may be attempted, how
//! long to wait between attempts, which errors are worth retrying and when to
//! give up. [`retry`] (or [`RetryConfig::execute`]) drives the operation until
//! it succeeds, the attempt budget is spent, the operation reports an
//! [`unrecoverable`] error, or the cancellation token fires.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use pulsearc_retry::{unrecoverable, DelayStrategy, OperationError, RetryConfig};
//!
//! #[derive(Debug, PartialEq)]
//! enum FetchError {
//!     Unavailable,
//!     NotFound,
//! }
//!
//! async fn fetch() -> Result<String, FetchError> {
//!     Err(FetchError::Unavailable)
//! }
//!
//! # async fn run() -> Result<(), pulsearc_retry::RetryError<FetchError>> {
//! let config = RetryConfig::builder()
//!     .attempts(5)
//!     .delay(Duration::from_millis(50))
//!     .max_delay(Duration::from_secs(2))
//!     .delay_strategy(DelayStrategy::FullJitter)
//!     .attempts_for(FetchError::Unavailable, 3)
//!     .build()?;
//!
//! let body = config
//!     .execute(|| async {
//!         match fetch().await {
//!             Err(FetchError::NotFound) => Err(unrecoverable(FetchError::NotFound)),
//!             other => other.map_err(OperationError::from),
//!         }
//!     })
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```
//!
//! Every failed attempt is kept in an [`ErrorHistory`], capped at
//! [`MAX_ERROR_HISTORY`] entries, and returned inside an [`AggregateError`]
//! when the loop gives up.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod budget;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod history;
pub mod metrics;
pub mod settings;
pub mod span;
pub mod strategy;

pub use budget::AttemptBudget;
pub use classifier::{Classification, ErrorClassifier};
pub use config::{AttemptRecord, ErrorPredicate, OnRetryFn, RetryConfig, RetryConfigBuilder};
pub use constants::{MAX_ERROR_HISTORY, UNLIMITED_ATTEMPTS};
pub use error::{
    unrecoverable, AggregateError, CancelReason, ConfigError, OperationError, RetryError,
    RetryResult, StopReason,
};
pub use executor::{retry, retry_with_cancellation};
pub use history::ErrorHistory;
pub use metrics::RetryMetrics;
pub use settings::{duration_millis, RetrySettings};
pub use span::RetrySpan;
pub use strategy::{DelayFn, DelaySettings, DelayStrategy};
pub use tokio_util::sync::CancellationToken;

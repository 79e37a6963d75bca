//! Typed error definitions for the barwatch pipeline.
//!
//! Provides [`BwError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the barwatch pipeline.
#[derive(Debug, Error)]
pub enum BwError {
    /// Invalid interval string, bad threshold, or unreadable config file.
    /// Fatal at construction time.
    #[error("config error: {0}")]
    Config(String),

    /// Data-source failure during a scheduled poll.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A subscriber or detector failed while handling a message.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// The bus could not complete a fan-out.
    #[error("publish error: {0}")]
    Publish(String),

    /// Exchange response parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Indicator input was unusable (non-finite prices, etc.).
    #[error("indicator error: {0}")]
    Indicator(String),
}

/// Shorthand result alias for [`BwError`].
pub type BwResult<T> = Result<T, BwError>;

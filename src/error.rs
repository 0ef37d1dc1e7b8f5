//! Error types for Turnstile.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// These are construction-time failures: a limiter that returns one of these
/// was never built and has no background tasks running.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// The token bucket builder was asked to build without any route limits.
    #[error("no rate limits configured")]
    NoLimitsConfigured,

    /// A rate with a zero interval cannot drive a refill timer.
    #[error("invalid rate for {context}: interval must be greater than zero")]
    InvalidRate {
        /// What the rate was configured for (e.g. a route).
        context: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// A per-request admission failure.
///
/// Rejections never escape the middleware as service errors; each one is
/// turned into a terminal HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The caller's identity is not in the registry.
    #[error("unknown identity")]
    Unauthorized,

    /// The caller is known but has no capacity left.
    #[error("rate limit exceeded, retry after {}s", retry_after.as_secs())]
    QuotaExceeded {
        /// Configured capacity, reported by limiters without per-caller state.
        limit: Option<u32>,
        /// Remaining quota, reported by per-caller limiters.
        remaining: Option<u32>,
        /// Time until the next refill tick.
        retry_after: Duration,
    },

    /// The identity is known but the route was never given a limit.
    #[error("route {route} has no configured limit")]
    UnconfiguredRoute {
        /// The route that was requested.
        route: String,
    },
}

impl Rejection {
    /// HTTP status used for the terminal response.
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Rejection::UnconfiguredRoute { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this rejection is a rate limit denial.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Rejection::QuotaExceeded { .. })
    }
}

//! Turnstile - Admission Control Middleware
//!
//! This crate throttles inbound HTTP traffic with one of two classical
//! shaping algorithms: a global leaking bucket (a fixed pool of slots that is
//! refilled on a timer) or a per-identity, per-route token bucket. Both run
//! their refills as background tokio tasks that start on the first request
//! and stop when the limiter is stopped.
//!
//! ```no_run
//! use std::time::Duration;
//! use axum::{routing::get, Router};
//! use turnstile::middleware::RateLimitLayer;
//! use turnstile::ratelimit::{Limit, Rate, TokenBucket};
//!
//! # fn main() -> turnstile::Result<()> {
//! let limiter = TokenBucket::builder()
//!     .set_limit("/bar", Limit::new(Rate::per_second(1), Rate::new(1, Duration::from_secs(2))))
//!     .register_user("u1")
//!     .build()?;
//!
//! let app: Router = Router::new()
//!     .route("/bar", get(|| async { "ok" }))
//!     .layer(RateLimitLayer::new(limiter));
//! # Ok(())
//! # }
//! ```

pub mod concurrent;
pub mod config;
pub mod error;
pub mod middleware;
pub mod ratelimit;
pub mod telemetry;

pub use error::{Rejection, Result, TurnstileError};
pub use telemetry::Telemetry;

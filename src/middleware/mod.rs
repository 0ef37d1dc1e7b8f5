//! HTTP middleware wrapping a limiter around a handler.
//!
//! - [`RateLimitLayer`]: Tower layer that puts an [`crate::ratelimit::AdmissionControl`]
//!   in front of any `Service<http::Request<B>>`.
//! - [`KeyExtractor`]: how the identity and route of a request are resolved;
//!   [`HeaderKeyExtractor`] reads an identity header and the URI path.

mod extract;
mod layer;
mod response;

pub use extract::{HeaderKeyExtractor, KeyExtractor, RequestKey, DEFAULT_IDENTITY_HEADER};
pub use layer::{RateLimitLayer, RateLimitService};
pub use response::{
    rejection_response, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RETRY_AFTER,
};

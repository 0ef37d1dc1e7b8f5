//! Admission trait for abstracting the leaking and token bucket limiters.

use async_trait::async_trait;

use super::leaking_bucket::LeakingBucket;
use super::token_bucket::TokenBucket;
use crate::error::Rejection;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request to the wrapped handler.
    Admitted {
        /// Quota left for this caller, when the limiter tracks one.
        remaining: Option<u32>,
    },
    /// Answer with a terminal response.
    Rejected(Rejection),
}

impl Decision {
    /// Helper to check if admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// Trait for limiter implementations.
///
/// This trait abstracts over [`LeakingBucket`] and [`TokenBucket`] so the
/// HTTP middleware can work with either.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request from `identity` on `route` may proceed.
    ///
    /// Never blocks; an admitted request has already consumed its capacity.
    fn check(&self, identity: &str, route: &str) -> Decision;

    /// Start background refill tasks, exactly once per instance.
    fn activate(&self);

    /// Signal background tasks to stop without waiting for them.
    fn stop(&self);

    /// Wait for background tasks to exit after [`AdmissionControl::stop`].
    async fn join(&self);
}

#[async_trait]
impl AdmissionControl for LeakingBucket {
    fn check(&self, _identity: &str, _route: &str) -> Decision {
        LeakingBucket::check(self)
    }

    fn activate(&self) {
        LeakingBucket::activate(self)
    }

    fn stop(&self) {
        LeakingBucket::stop(self)
    }

    async fn join(&self) {
        LeakingBucket::join(self).await
    }
}

#[async_trait]
impl AdmissionControl for TokenBucket {
    fn check(&self, identity: &str, route: &str) -> Decision {
        TokenBucket::check(self, identity, route)
    }

    fn activate(&self) {
        TokenBucket::activate(self)
    }

    fn stop(&self) {
        TokenBucket::stop(self)
    }

    async fn join(&self) {
        TokenBucket::join(self).await
    }
}

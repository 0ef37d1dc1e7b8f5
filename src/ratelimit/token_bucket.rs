//! Token bucket limiter.
//!
//! Every registered identity gets an independent quota on every configured
//! route. Quotas are consumed one unit per admitted request and topped up by
//! one background task per route.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::backend::Decision;
use super::lifecycle::{run_periodic, BackgroundTasks};
use super::quota::{Consumption, QuotaKey, QuotaTable};
use super::rate::Limit;
use crate::concurrent::{ConcurrentMap, ConcurrentSet};
use crate::error::{Rejection, Result, TurnstileError};
use crate::telemetry::Telemetry;

/// Collects route limits and registered users for a [`TokenBucket`].
#[derive(Debug, Default)]
pub struct TokenBucketBuilder {
    limits: ConcurrentMap<String, Limit>,
    users: ConcurrentSet<String>,
    telemetry: Telemetry,
}

impl TokenBucketBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit for `route`, replacing any previous one.
    pub fn set_limit(self, route: impl Into<String>, limit: Limit) -> Self {
        self.limits.put(route.into(), limit);
        self
    }

    /// Register a user. Registering twice has no effect.
    pub fn register_user(self, identity: impl Into<String>) -> Self {
        self.users.put(identity.into());
        self
    }

    /// Send the limiter's tracing events to `telemetry`.
    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Build the limiter with every quota at full capacity.
    ///
    /// Fails without allocating any limiter state if no route has a limit or
    /// a refill interval is zero. No tasks are spawned here; they start on
    /// the first request.
    pub fn build(self) -> Result<TokenBucket> {
        if self.limits.is_empty() {
            return Err(TurnstileError::NoLimitsConfigured);
        }

        let routes = self.limits.snapshot();
        for (route, limit) in &routes {
            limit.refill.validate(route)?;
        }

        let quotas = QuotaTable::new();
        self.users.for_each(|identity| {
            for (route, limit) in &routes {
                quotas.seed(QuotaKey::new(identity.as_str(), route.as_str()), limit.capacity.value);
            }
        });

        self.telemetry.in_scope(|| {
            info!(
                routes = routes.len(),
                users = self.users.size(),
                entries = quotas.len(),
                "Token bucket built"
            )
        });

        Ok(TokenBucket {
            limits: self.limits,
            users: Arc::new(self.users),
            quotas: Arc::new(quotas),
            tasks: BackgroundTasks::new(self.telemetry),
        })
    }
}

/// Per-identity, per-route token bucket limiter.
///
/// Identities and route limits are fixed when the limiter is built. The
/// refill tasks start lazily on the first request that goes through the
/// middleware and must be stopped with [`TokenBucket::stop`] during shutdown.
pub struct TokenBucket {
    limits: ConcurrentMap<String, Limit>,
    users: Arc<ConcurrentSet<String>>,
    quotas: Arc<QuotaTable>,
    tasks: BackgroundTasks,
}

impl TokenBucket {
    /// Start building a token bucket.
    pub fn builder() -> TokenBucketBuilder {
        TokenBucketBuilder::new()
    }

    /// Current quota for `identity` on `route`.
    ///
    /// `None` if the identity is not registered or the route has no limit.
    pub fn get_quota(&self, identity: &str, route: &str) -> Option<u32> {
        self.quotas.get(identity, route)
    }

    /// Decrement the quota by one, never below zero.
    pub fn decr_quota(&self, identity: &str, route: &str) {
        self.quotas.decrement(identity, route);
    }

    /// The limit configured for `route`.
    pub fn limit(&self, route: &str) -> Option<Limit> {
        self.limits.get(route)
    }

    /// Check whether `identity` was registered at build time.
    pub fn is_registered(&self, identity: &str) -> bool {
        self.users.contains(identity)
    }

    /// Number of quota entries.
    pub fn entry_count(&self) -> usize {
        self.quotas.len()
    }

    /// Admit or reject one request, consuming a unit of quota on admission.
    pub fn check(&self, identity: &str, route: &str) -> Decision {
        let decision = if !self.is_registered(identity) {
            Decision::Rejected(Rejection::Unauthorized)
        } else {
            match self.quotas.try_consume(identity, route) {
                Consumption::Consumed { remaining } => Decision::Admitted {
                    remaining: Some(remaining),
                },
                Consumption::Exhausted => Decision::Rejected(Rejection::QuotaExceeded {
                    limit: None,
                    remaining: Some(0),
                    retry_after: self.retry_after(route),
                }),
                Consumption::Missing => Decision::Rejected(Rejection::UnconfiguredRoute {
                    route: route.to_string(),
                }),
            }
        };

        self.tasks.telemetry().in_scope(|| {
            debug!(
                identity = %identity,
                route = %route,
                decision = ?decision,
                "Admission decision made"
            )
        });

        decision
    }

    fn retry_after(&self, route: &str) -> Duration {
        self.limit(route)
            .map(|limit| limit.refill.interval)
            .unwrap_or_default()
    }

    /// Start one refill task per route unless they are already running.
    pub fn activate(&self) {
        self.tasks.start_once(|spawner| {
            self.limits.for_each(|route, limit| {
                let route = route.clone();
                let limit = *limit;
                let users = self.users.clone();
                let quotas = self.quotas.clone();
                let shutdown = spawner.shutdown();

                spawner.spawn(async move {
                    info!(route = %route, interval = ?limit.refill.interval, "Starting refill task");

                    run_periodic(shutdown, limit.refill.interval, || {
                        users.for_each(|identity| {
                            quotas.replenish(identity, &route, &limit);
                        });
                        debug!(route = %route, amount = limit.refill.value, "Refilled quotas");
                    })
                    .await;

                    info!(route = %route, "Stopping refill task");
                });
            });
        });
    }

    /// Check whether the refill tasks have been started.
    pub fn is_active(&self) -> bool {
        self.tasks.is_started()
    }

    /// Signal every refill task to stop. Does not wait for them to exit.
    pub fn stop(&self) {
        self.tasks.stop();
    }

    /// Wait for the refill tasks to exit after [`TokenBucket::stop`].
    pub async fn join(&self) {
        self.tasks.join().await;
    }
}

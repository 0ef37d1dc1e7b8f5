//! Per-limiter log routing.
//!
//! Limiters never install a global subscriber. A [`Telemetry`] optionally
//! carries a [`Dispatch`] that the limiter's background tasks and request
//! path report to; without one, events go to whatever subscriber the host
//! has set as default (a no-op when none is installed).

use std::future::Future;

use tracing::dispatcher::{self, Dispatch};
use tracing::instrument::{WithDispatch, WithSubscriber};

/// Where a limiter sends its tracing events.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    dispatch: Option<Dispatch>,
}

impl Telemetry {
    /// Route events to `dispatch`.
    pub fn new(dispatch: impl Into<Dispatch>) -> Self {
        Self {
            dispatch: Some(dispatch.into()),
        }
    }

    /// Use the host's default subscriber.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Run `f` with this telemetry's dispatcher as the thread default.
    pub(crate) fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Attach the dispatcher to a future that is about to be spawned.
    ///
    /// Spawned tasks do not see the spawning thread's scoped default, so the
    /// current one is captured here when no explicit dispatch was given.
    pub(crate) fn instrument<F: Future>(&self, future: F) -> WithDispatch<F> {
        let dispatch = match &self.dispatch {
            Some(dispatch) => dispatch.clone(),
            None => dispatcher::get_default(Dispatch::clone),
        };
        future.with_subscriber(dispatch)
    }
}

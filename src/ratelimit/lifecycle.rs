//! Background refill task lifecycle shared by both limiters.
//!
//! Each limiter owns one [`BackgroundTasks`]: a single cancellation signal
//! for all of its tasks, an exactly-once start guard, and the join handles
//! needed to wait for the tasks to exit.

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::warn;

use crate::telemetry::Telemetry;

/// Cancellation signal, start guard and task handles for one limiter.
pub(crate) struct BackgroundTasks {
    started: Once,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    telemetry: Telemetry,
}

impl BackgroundTasks {
    pub(crate) fn new(telemetry: Telemetry) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            started: Once::new(),
            shutdown,
            handles: Mutex::new(Vec::new()),
            telemetry,
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Run `start` the first time this is called from inside a tokio runtime.
    ///
    /// Concurrent callers block until the winning caller's `start` returns,
    /// so every caller observes the tasks as spawned.
    pub(crate) fn start_once(&self, start: impl FnOnce(&Spawner<'_>)) {
        if self.started.is_completed() {
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.telemetry
                    .in_scope(|| warn!("Cannot start refill tasks outside of a tokio runtime"));
                return;
            }
        };

        self.started.call_once(|| {
            start(&Spawner {
                tasks: self,
                runtime,
            })
        });
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.is_completed()
    }

    /// Number of spawned tasks not yet joined.
    pub(crate) fn task_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Fire the cancellation signal. Idempotent, does not wait.
    pub(crate) fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait for every spawned task to exit.
    ///
    /// Only meaningful after [`BackgroundTasks::stop`]; otherwise the tasks
    /// run until the limiter is dropped.
    pub(crate) async fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                self.telemetry
                    .in_scope(|| warn!(error = %e, "Refill task terminated abnormally"));
            }
        }
    }
}

/// Handed to a limiter's start routine to spawn its tasks.
pub(crate) struct Spawner<'a> {
    tasks: &'a BackgroundTasks,
    runtime: Handle,
}

impl Spawner<'_> {
    /// A receiver for the owning limiter's cancellation signal.
    pub(crate) fn shutdown(&self) -> Shutdown {
        Shutdown(self.tasks.shutdown.subscribe())
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(self.tasks.telemetry.instrument(task));
        self.tasks.handles.lock().push(handle);
    }
}

/// Resolves once the owning limiter is stopped or dropped.
pub(crate) struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub(crate) async fn cancelled(&mut self) {
        // An error means the sender is gone, which is as final as a stop.
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

/// Call `tick` every `period` until `shutdown` fires.
///
/// The first tick happens one full period after the call, not immediately.
pub(crate) async fn run_periodic(mut shutdown: Shutdown, period: Duration, mut tick: impl FnMut()) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_run_periodic_ticks_until_stopped() {
        let tasks = BackgroundTasks::new(Telemetry::inherit());
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        tasks.start_once(|spawner| {
            let shutdown = spawner.shutdown();
            spawner.spawn(run_periodic(shutdown, Duration::from_secs(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        });

        // No tick at time zero.
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        tasks.stop();
        tasks.join().await;

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_start_once_runs_once() {
        let tasks = BackgroundTasks::new(Telemetry::inherit());
        let starts = AtomicUsize::new(0);

        for _ in 0..5 {
            tasks.start_once(|_| {
                starts.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(tasks.is_started());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_start_once_spawns_once() {
        const CALLERS: usize = 16;

        let tasks = Arc::new(BackgroundTasks::new(Telemetry::inherit()));
        let starts = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));

        let callers: Vec<_> = (0..CALLERS)
            .map(|_| {
                let tasks = tasks.clone();
                let starts = starts.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    tasks.start_once(|spawner| {
                        starts.fetch_add(1, Ordering::SeqCst);
                        spawner.spawn(run_periodic(spawner.shutdown(), Duration::from_secs(60), || {}));
                    });
                    // Every caller returns after the tasks are spawned.
                    assert_eq!(tasks.task_count(), 1);
                })
            })
            .collect();

        for caller in callers {
            caller.await.unwrap();
        }

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.task_count(), 1);

        tasks.stop();
        tasks.join().await;
        assert_eq!(tasks.task_count(), 0);
    }

    #[test]
    fn test_start_once_outside_runtime_is_deferred() {
        let tasks = BackgroundTasks::new(Telemetry::inherit());

        tasks.start_once(|_| panic!("must not start without a runtime"));

        assert!(!tasks.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_started_after_stop_exits_immediately() {
        let tasks = BackgroundTasks::new(Telemetry::inherit());
        tasks.stop();
        tasks.stop();
        assert!(tasks.is_stopped());

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        tasks.start_once(|spawner| {
            spawner.spawn(run_periodic(spawner.shutdown(), Duration::from_secs(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        });

        tasks.join().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_join_without_start_returns() {
        let tasks = BackgroundTasks::new(Telemetry::inherit());
        tasks.join().await;
        assert!(!tasks.is_started());
    }
}

//! Leaking bucket limiter.
//!
//! Requests are served at a fixed rate from a single bounded pool of
//! anonymous slots that is refilled on a timer: once the pool is empty,
//! further requests are dropped until the next refill.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, trace};

use super::backend::Decision;
use super::lifecycle::{run_periodic, BackgroundTasks};
use super::rate::Rate;
use crate::error::{Rejection, Result};
use crate::telemetry::Telemetry;

/// Bounded pool of anonymous slots.
///
/// Holds between zero and `capacity` slots. Once closed, every
/// [`SlotPool::pop`] fails.
#[derive(Debug)]
pub struct SlotPool {
    slots: Semaphore,
    capacity: u32,
}

impl SlotPool {
    /// Create a full pool.
    ///
    /// Capacities above [`Semaphore::MAX_PERMITS`] are clamped to it.
    pub fn new(capacity: u32) -> Self {
        let capacity = u32::try_from(Semaphore::MAX_PERMITS).map_or(capacity, |max| capacity.min(max));
        Self {
            slots: Semaphore::new(capacity as usize),
            capacity,
        }
    }

    /// Take one slot without waiting.
    ///
    /// Returns `false`, leaving the pool unchanged, when it is empty or closed.
    pub fn pop(&self) -> bool {
        match self.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Add up to `amount` slots without exceeding capacity.
    ///
    /// Returns the number of slots actually added. Must only be called by the
    /// pool's single refill task: concurrent pops can only shrink the pool,
    /// so the computed headroom never overshoots.
    pub(crate) fn refill(&self, amount: u32) -> u32 {
        let headroom = self.capacity as usize - self.slots.available_permits().min(self.capacity as usize);
        let added = headroom.min(amount as usize);
        self.slots.add_permits(added);
        added as u32
    }

    /// Retire the pool permanently.
    pub(crate) fn close(&self) {
        self.slots.close();
    }

    /// Slots currently available.
    pub fn available(&self) -> usize {
        if self.slots.is_closed() {
            return 0;
        }
        self.slots.available_permits()
    }

    /// Maximum number of slots.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Global leaking bucket limiter.
///
/// The refill task is started lazily by the first request that goes through
/// the middleware and must be stopped with [`LeakingBucket::stop`] during
/// shutdown.
pub struct LeakingBucket {
    pool: Arc<SlotPool>,
    rate: Rate,
    tasks: BackgroundTasks,
}

impl LeakingBucket {
    /// Create a limiter whose pool holds and refills `rate.value` slots
    /// every `rate.interval`.
    pub fn new(rate: Rate) -> Result<Self> {
        Self::with_telemetry(rate, Telemetry::inherit())
    }

    /// Like [`LeakingBucket::new`], logging to `telemetry`.
    pub fn with_telemetry(rate: Rate, telemetry: Telemetry) -> Result<Self> {
        rate.validate("leaking bucket")?;

        Ok(Self {
            pool: Arc::new(SlotPool::new(rate.value)),
            rate,
            tasks: BackgroundTasks::new(telemetry),
        })
    }

    /// The configured rate.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Slots currently available.
    pub fn available(&self) -> usize {
        self.pool.available()
    }

    /// Take one slot if available.
    pub fn pop(&self) -> bool {
        self.pool.pop()
    }

    /// Admit or reject one request.
    pub fn check(&self) -> Decision {
        if self.pop() {
            self.tasks.telemetry().in_scope(|| trace!("Slot taken"));
            return Decision::Admitted { remaining: None };
        }

        self.tasks
            .telemetry()
            .in_scope(|| debug!(capacity = self.rate.value, "Leaking bucket empty"));

        Decision::Rejected(Rejection::QuotaExceeded {
            limit: Some(self.rate.value),
            remaining: None,
            retry_after: self.rate.interval,
        })
    }

    /// Start the refill task unless it is already running.
    pub fn activate(&self) {
        self.tasks.start_once(|spawner| {
            let pool = self.pool.clone();
            let rate = self.rate;
            let shutdown = spawner.shutdown();

            spawner.spawn(async move {
                info!(capacity = rate.value, interval = ?rate.interval, "Starting leaking bucket refill task");

                run_periodic(shutdown, rate.interval, || {
                    let added = pool.refill(rate.value);
                    debug!(added = added, available = pool.available(), "Refilled leaking bucket");
                })
                .await;

                pool.close();
                info!("Stopping leaking bucket refill task");
            });
        });
    }

    /// Check whether the refill task has been started.
    pub fn is_active(&self) -> bool {
        self.tasks.is_started()
    }

    /// Signal the refill task to stop. Does not wait for it to exit.
    pub fn stop(&self) {
        self.tasks.stop();
    }

    /// Wait for the refill task to exit after [`LeakingBucket::stop`].
    pub async fn join(&self) {
        self.tasks.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    #[test]
    fn test_pool_starts_full() {
        let pool = SlotPool::new(3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn test_pool_capacity_never_exceeds_semaphore_limit() {
        let pool = SlotPool::new(u32::MAX);

        assert!(pool.capacity() as usize <= Semaphore::MAX_PERMITS);
        assert_eq!(pool.available(), pool.capacity() as usize);
        assert!(pool.pop());
        assert_eq!(pool.refill(u32::MAX), 1);
    }

    #[test]
    fn test_pool_pops_exactly_capacity() {
        let pool = SlotPool::new(5);

        for _ in 0..5 {
            assert!(pool.pop());
        }

        // The 6th pop should fail and leave the pool empty
        assert!(!pool.pop());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_pool_refill_saturates() {
        let pool = SlotPool::new(3);
        assert_eq!(pool.refill(3), 0);

        pool.pop();
        pool.pop();
        assert_eq!(pool.refill(3), 2);
        assert_eq!(pool.available(), 3);

        pool.pop();
        assert_eq!(pool.refill(3), 1);
        assert_eq!(pool.refill(3), 0);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_closed_pool_is_empty() {
        let pool = SlotPool::new(2);
        pool.close();

        assert!(!pool.pop());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_zero_capacity_pool() {
        let pool = SlotPool::new(0);
        assert!(!pool.pop());
        assert_eq!(pool.refill(5), 0);
    }

    #[test]
    fn test_concurrent_pops_never_double_spend() {
        let pool = SlotPool::new(100);
        let admitted = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        if pool.pop() {
                            admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.into_inner(), 100);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = LeakingBucket::new(Rate::new(1, Duration::ZERO));
        assert!(result.is_err());
    }

    #[test]
    fn test_check_reports_capacity_and_retry() {
        let limiter = LeakingBucket::new(Rate::new(1, Duration::from_secs(30))).unwrap();

        assert!(limiter.check().is_admitted());
        assert_eq!(
            limiter.check(),
            Decision::Rejected(Rejection::QuotaExceeded {
                limit: Some(1),
                remaining: None,
                retry_after: Duration::from_secs(30),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_interval() {
        let limiter = LeakingBucket::new(Rate::new(2, Duration::from_secs(1))).unwrap();
        limiter.activate();

        assert!(limiter.pop());
        assert!(limiter.pop());
        assert!(!limiter.pop());

        time::sleep(Duration::from_millis(1100)).await;

        assert!(limiter.pop());
        assert!(limiter.pop());
        assert!(!limiter.pop());

        limiter.stop();
        limiter.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = LeakingBucket::new(Rate::new(3, Duration::from_millis(100))).unwrap();
        limiter.activate();

        assert!(limiter.pop());
        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(limiter.available(), 3);

        limiter.stop();
        limiter.join().await;
    }

    #[tokio::test]
    async fn test_no_refill_without_activation() {
        let limiter = LeakingBucket::new(Rate::new(1, Duration::from_millis(10))).unwrap();

        assert!(limiter.pop());
        time::sleep(Duration::from_millis(50)).await;

        assert!(!limiter.is_active());
        assert!(!limiter.pop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_pool() {
        let limiter = LeakingBucket::new(Rate::new(2, Duration::from_secs(1))).unwrap();
        limiter.activate();
        assert!(limiter.is_active());

        limiter.stop();
        limiter.join().await;

        assert!(!limiter.pop());
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let limiter = LeakingBucket::new(Rate::per_second(1)).unwrap();
        limiter.stop();

        assert!(!limiter.is_active());
        assert!(limiter.pop());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_activation_spawns_one_task() {
        const CALLERS: usize = 16;

        let limiter = Arc::new(LeakingBucket::new(Rate::per_minute(5)).unwrap());
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    limiter.activate();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(limiter.tasks.task_count(), 1);

        limiter.stop();
        limiter.join().await;
    }
}

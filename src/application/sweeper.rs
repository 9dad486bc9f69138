use crate::domain::ids::MembershipId;
use crate::domain::ports::LedgerStoreRef;
use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use mockable::Clock;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Periodically expires active memberships whose end time has passed.
///
/// Bookings already expire lapsed memberships they run into, so the sweeper
/// only has to catch the ones nobody touches. Sweeping is idempotent, and at
/// most one sweep runs at a time per sweeper.
pub struct ExpirySweeper {
    store: LedgerStoreRef,
    clock: Arc<dyn Clock>,
    interval: Duration,
    jitter: Duration,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a sweep ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExpirySweeper {
    pub fn new(
        store: LedgerStoreRef,
        clock: Arc<dyn Clock>,
        interval: Duration,
        jitter: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            jitter,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Expires every lapsed membership and returns how many were flipped.
    ///
    /// Each membership is expired in its own unit of work under its row lock
    /// and re-checked after locking, so a membership consumed or expired
    /// concurrently is left alone. Fails with [`BookingError::Busy`] if a
    /// sweep is already running.
    pub async fn run_once(&self) -> Result<usize> {
        let _flight = InFlight::enter(&self.in_flight).ok_or(BookingError::Busy)?;
        let now = self.clock.utc();

        let lapsed = {
            let mut uow = self.store.begin().await?;
            let lapsed = uow.lapsed_memberships(now).await?;
            uow.rollback().await;
            lapsed
        };

        let mut expired = 0;
        for id in lapsed {
            match self.expire(id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(membership = %id, error = %e, "could not expire membership");
                }
            }
        }

        tracing::debug!(expired, "expiry sweep finished");
        Ok(expired)
    }

    async fn expire(&self, id: MembershipId, now: DateTime<Utc>) -> Result<bool> {
        let mut uow = self.store.begin().await?;
        let Some(mut membership) = uow.lock_membership(id).await? else {
            return Ok(false);
        };
        if !membership.is_active() || membership.end >= now {
            return Ok(false);
        }

        membership.expire();
        uow.update_membership(membership).await?;
        uow.commit().await?;
        tracing::info!(membership = %id, "membership expired");
        Ok(true)
    }

    /// Sweeps every interval plus a random jitter until `cancel` turns true
    /// or its sender goes away. Failed sweeps are logged and retried on the
    /// next tick.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            interval = ?self.interval,
            jitter = ?self.jitter,
            "expiry sweeper started"
        );

        while !*cancel.borrow() {
            let delay = self.interval + self.sample_jitter();
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    match self.run_once().await {
                        Ok(0) => {}
                        Ok(expired) => tracing::info!(expired, "expired lapsed memberships"),
                        Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
                    }
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }

    fn sample_jitter(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

use crate::domain::ids::{BookingId, ClassId, MembershipId, PaymentId};
use crate::error::{BookingError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Identifies one lockable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKey {
    Class(ClassId),
    Booking(BookingId),
    Membership(MembershipId),
    Payment(PaymentId),
}

/// Table of per-row exclusive locks.
///
/// Entries are created on first use and removed again once no unit of work
/// holds or waits for them, so the table only grows with contention, not
/// with the number of rows.
#[derive(Default)]
pub struct RowLocks {
    rows: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the exclusive lock on `key`.
    pub async fn acquire(self: &Arc<Self>, key: RowKey, timeout: Duration) -> Result<RowGuard> {
        let row = Arc::clone(self.table().entry(key).or_default());
        let acquired = tokio::time::timeout(timeout, Arc::clone(&row).lock_owned()).await;
        drop(row);

        match acquired {
            Ok(guard) => Ok(RowGuard {
                key,
                guard: Some(guard),
                locks: Arc::clone(self),
            }),
            Err(_) => {
                self.prune(key);
                tracing::warn!(
                    ?key,
                    ?timeout,
                    contended = self.contended(),
                    "row lock wait timed out"
                );
                Err(BookingError::Busy)
            }
        }
    }

    /// Number of rows currently locked or waited on.
    pub fn contended(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, key: RowKey) {
        let mut rows = self.table();
        // Handles are only cloned under this mutex, so a count of one means
        // the table holds the last reference.
        if rows.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
            rows.remove(&key);
        }
    }
}

/// Exclusive hold on one row; released on drop.
pub struct RowGuard {
    key: RowKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<RowLocks>,
}

impl RowGuard {
    pub fn key(&self) -> RowKey {
        self.key
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.prune(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_second_holder_times_out() {
        let locks = Arc::new(RowLocks::new());
        let key = RowKey::Class(ClassId(1));

        let held = locks.acquire(key, WAIT).await.unwrap();
        assert!(matches!(
            locks.acquire(key, WAIT).await,
            Err(BookingError::Busy)
        ));
        drop(held);

        let again = locks.acquire(key, WAIT).await.unwrap();
        assert_eq!(again.key(), key);
    }

    #[tokio::test]
    async fn test_distinct_rows_do_not_contend() {
        let locks = Arc::new(RowLocks::new());
        let _a = locks
            .acquire(RowKey::Membership(MembershipId(1)), WAIT)
            .await
            .unwrap();
        let _b = locks
            .acquire(RowKey::Membership(MembershipId(2)), WAIT)
            .await
            .unwrap();
        let _c = locks
            .acquire(RowKey::Payment(PaymentId(1)), WAIT)
            .await
            .unwrap();
        assert_eq!(locks.contended(), 3);
    }

    #[tokio::test]
    async fn test_released_rows_are_pruned() {
        let locks = Arc::new(RowLocks::new());
        let guard = locks
            .acquire(RowKey::Booking(BookingId(7)), WAIT)
            .await
            .unwrap();
        assert_eq!(locks.contended(), 1);
        drop(guard);
        assert_eq!(locks.contended(), 0);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(RowLocks::new());
        let key = RowKey::Class(ClassId(3));
        let held = locks.acquire(key, WAIT).await.unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(key, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let guard = waiter.await.unwrap().unwrap();
        assert_eq!(guard.key(), key);
    }
}

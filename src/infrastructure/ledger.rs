use super::locks::{RowGuard, RowKey, RowLocks};
use crate::domain::booking::{Booking, NewBooking};
use crate::domain::class::{Class, NewClass};
use crate::domain::ids::{BookingId, ClassId, MembershipId, PaymentId, UserId};
use crate::domain::membership::{Membership, NewMembership};
use crate::domain::payment::{NewPayment, Payment};
use crate::domain::ports::{LedgerStore, UnitOfWork};
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Row predicate passed down to a backend scan.
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Classes,
    Payments,
    Memberships,
    Bookings,
}

/// Writes staged by a unit of work, applied atomically on commit.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub classes: BTreeMap<ClassId, Class>,
    pub payments: BTreeMap<PaymentId, Payment>,
    pub memberships: BTreeMap<MembershipId, Membership>,
    pub bookings: BTreeMap<BookingId, Booking>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.payments.is_empty()
            && self.memberships.is_empty()
            && self.bookings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len() + self.payments.len() + self.memberships.len() + self.bookings.len()
    }
}

/// Committed-state storage engine underneath a [`Ledger`].
///
/// Backends only need snapshot reads and an atomic `apply`; row locking,
/// staging and read-your-writes are handled by the ledger.
#[async_trait]
pub trait LedgerBackend: Send + Sync + 'static {
    async fn class(&self, id: ClassId) -> Result<Option<Class>>;
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>>;
    async fn booking(&self, id: BookingId) -> Result<Option<Booking>>;
    async fn scan_memberships(&self, filter: Filter<'_, Membership>) -> Result<Vec<Membership>>;
    async fn scan_bookings(&self, filter: Filter<'_, Booking>) -> Result<Vec<Booking>>;
    /// Allocates a fresh id. Ids are never reused, even if the unit of work
    /// that allocated one rolls back.
    fn next_id(&self, table: Table) -> u64;
    /// Applies every change or none of them.
    async fn apply(&self, changes: ChangeSet) -> Result<()>;
}

/// Monotonic id counters, one per table.
#[derive(Debug, Default)]
pub struct IdSequences {
    classes: AtomicU64,
    payments: AtomicU64,
    memberships: AtomicU64,
    bookings: AtomicU64,
}

impl IdSequences {
    /// Counters that continue after the given highest ids.
    pub fn starting_after(classes: u64, payments: u64, memberships: u64, bookings: u64) -> Self {
        Self {
            classes: AtomicU64::new(classes),
            payments: AtomicU64::new(payments),
            memberships: AtomicU64::new(memberships),
            bookings: AtomicU64::new(bookings),
        }
    }

    pub fn next(&self, table: Table) -> u64 {
        let counter = match table {
            Table::Classes => &self.classes,
            Table::Payments => &self.payments,
            Table::Memberships => &self.memberships,
            Table::Bookings => &self.bookings,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A [`LedgerStore`] over any [`LedgerBackend`], adding row locks and
/// staged units of work.
pub struct Ledger<B: LedgerBackend> {
    backend: Arc<B>,
    locks: Arc<RowLocks>,
    lock_timeout: Duration,
}

impl<B: LedgerBackend> Clone for Ledger<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            locks: Arc::clone(&self.locks),
            lock_timeout: self.lock_timeout,
        }
    }
}

impl<B: LedgerBackend> Ledger<B> {
    pub fn new(backend: B, lock_timeout: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            locks: Arc::new(RowLocks::new()),
            lock_timeout,
        }
    }
}

#[async_trait]
impl<B: LedgerBackend> LedgerStore for Ledger<B> {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(StagedUnitOfWork {
            backend: Arc::clone(&self.backend),
            locks: Arc::clone(&self.locks),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            staged: ChangeSet::default(),
        }))
    }
}

struct StagedUnitOfWork<B: LedgerBackend> {
    backend: Arc<B>,
    locks: Arc<RowLocks>,
    lock_timeout: Duration,
    held: HashMap<RowKey, RowGuard>,
    staged: ChangeSet,
}

/// Merges staged rows over a committed scan. Staged rows replace committed
/// ones with the same id and are dropped if they no longer match.
fn overlay<K, T>(
    committed: Vec<T>,
    staged: &BTreeMap<K, T>,
    id: impl Fn(&T) -> K,
    filter: Filter<'_, T>,
) -> Vec<T>
where
    K: Ord + Copy,
    T: Clone,
{
    let mut rows: BTreeMap<K, T> = committed.into_iter().map(|row| (id(&row), row)).collect();
    for (key, row) in staged {
        if filter(row) {
            rows.insert(*key, row.clone());
        } else {
            rows.remove(key);
        }
    }
    rows.into_values().collect()
}

impl<B: LedgerBackend> StagedUnitOfWork<B> {
    async fn lock(&mut self, key: RowKey) -> Result<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let guard = self.locks.acquire(key, self.lock_timeout).await?;
        tracing::trace!(?key, "row lock acquired");
        self.held.insert(key, guard);
        Ok(())
    }

    fn ensure_locked(&self, key: RowKey) -> Result<()> {
        if self.held.contains_key(&key) {
            Ok(())
        } else {
            Err(BookingError::StoreFailure(format!(
                "update of {key:?} without holding its row lock"
            )))
        }
    }

    async fn bookings_where(&self, filter: Filter<'_, Booking>) -> Result<Vec<Booking>> {
        let committed = self.backend.scan_bookings(filter).await?;
        Ok(overlay(committed, &self.staged.bookings, |b: &Booking| b.id, filter))
    }

    async fn memberships_where(&self, filter: Filter<'_, Membership>) -> Result<Vec<Membership>> {
        let committed = self.backend.scan_memberships(filter).await?;
        Ok(overlay(committed, &self.staged.memberships, |m: &Membership| m.id, filter))
    }
}

#[async_trait]
impl<B: LedgerBackend> UnitOfWork for StagedUnitOfWork<B> {
    async fn class(&mut self, id: ClassId) -> Result<Option<Class>> {
        match self.staged.classes.get(&id) {
            Some(class) => Ok(Some(class.clone())),
            None => self.backend.class(id).await,
        }
    }

    async fn booking(&mut self, id: BookingId) -> Result<Option<Booking>> {
        match self.staged.bookings.get(&id) {
            Some(booking) => Ok(Some(booking.clone())),
            None => self.backend.booking(id).await,
        }
    }

    async fn membership(&mut self, id: MembershipId) -> Result<Option<Membership>> {
        match self.staged.memberships.get(&id) {
            Some(membership) => Ok(Some(membership.clone())),
            None => self.backend.membership(id).await,
        }
    }

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        match self.staged.payments.get(&id) {
            Some(payment) => Ok(Some(payment.clone())),
            None => self.backend.payment(id).await,
        }
    }

    async fn occupied_seats(&mut self, class: ClassId) -> Result<u32> {
        let seated = self
            .bookings_where(&|b: &Booking| b.class == class && b.occupies_seat())
            .await?;
        Ok(u32::try_from(seated.len()).unwrap_or(u32::MAX))
    }

    async fn seat_of(&mut self, user: UserId, class: ClassId) -> Result<Option<Booking>> {
        let seated = self
            .bookings_where(&|b: &Booking| b.user == user && b.class == class && b.occupies_seat())
            .await?;
        Ok(seated.into_iter().next())
    }

    async fn bookings_for_user(&mut self, user: UserId) -> Result<Vec<Booking>> {
        self.bookings_where(&|b: &Booking| b.user == user).await
    }

    async fn booking_for_payment(&mut self, payment: PaymentId) -> Result<Option<Booking>> {
        let bookings = self
            .bookings_where(&|b: &Booking| b.consumption.payment() == Some(payment))
            .await?;
        Ok(bookings.into_iter().next())
    }

    async fn active_memberships(&mut self, user: UserId) -> Result<Vec<Membership>> {
        let mut memberships = self
            .memberships_where(&|m: &Membership| m.user == user && m.is_active())
            .await?;
        memberships.sort_by_key(|m| (m.end, m.id));
        Ok(memberships)
    }

    async fn memberships_for_user(&mut self, user: UserId) -> Result<Vec<Membership>> {
        let mut memberships = self
            .memberships_where(&|m: &Membership| m.user == user)
            .await?;
        memberships.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
        Ok(memberships)
    }

    async fn membership_for_payment(&mut self, payment: PaymentId) -> Result<Option<Membership>> {
        let memberships = self
            .memberships_where(&|m: &Membership| m.payment == Some(payment))
            .await?;
        Ok(memberships.into_iter().next())
    }

    async fn lapsed_memberships(&mut self, now: DateTime<Utc>) -> Result<Vec<MembershipId>> {
        let lapsed = self
            .memberships_where(&|m: &Membership| m.is_active() && m.end < now)
            .await?;
        Ok(lapsed.into_iter().map(|m| m.id).collect())
    }

    async fn lock_class(&mut self, id: ClassId) -> Result<Option<Class>> {
        self.lock(RowKey::Class(id)).await?;
        self.class(id).await
    }

    async fn lock_booking(&mut self, id: BookingId) -> Result<Option<Booking>> {
        self.lock(RowKey::Booking(id)).await?;
        self.booking(id).await
    }

    async fn lock_membership(&mut self, id: MembershipId) -> Result<Option<Membership>> {
        self.lock(RowKey::Membership(id)).await?;
        self.membership(id).await
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        self.lock(RowKey::Payment(id)).await?;
        self.payment(id).await
    }

    async fn insert_class(&mut self, class: NewClass) -> Result<Class> {
        let id = ClassId(self.backend.next_id(Table::Classes));
        self.lock(RowKey::Class(id)).await?;
        let class = class.into_class(id);
        self.staged.classes.insert(id, class.clone());
        Ok(class)
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let id = PaymentId(self.backend.next_id(Table::Payments));
        self.lock(RowKey::Payment(id)).await?;
        let payment = payment.into_payment(id);
        self.staged.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn insert_membership(&mut self, membership: NewMembership) -> Result<Membership> {
        let id = MembershipId(self.backend.next_id(Table::Memberships));
        self.lock(RowKey::Membership(id)).await?;
        let membership = membership.into_membership(id);
        self.staged.memberships.insert(id, membership.clone());
        Ok(membership)
    }

    async fn insert_booking(
        &mut self,
        booking: NewBooking,
        now: DateTime<Utc>,
    ) -> Result<Booking> {
        let id = BookingId(self.backend.next_id(Table::Bookings));
        self.lock(RowKey::Booking(id)).await?;
        let booking = booking.into_booking(id, now);
        self.staged.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn update_class(&mut self, class: Class) -> Result<()> {
        self.ensure_locked(RowKey::Class(class.id))?;
        self.staged.classes.insert(class.id, class);
        Ok(())
    }

    async fn update_payment(&mut self, payment: Payment) -> Result<()> {
        self.ensure_locked(RowKey::Payment(payment.id))?;
        self.staged.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn update_membership(&mut self, membership: Membership) -> Result<()> {
        self.ensure_locked(RowKey::Membership(membership.id))?;
        self.staged.memberships.insert(membership.id, membership);
        Ok(())
    }

    async fn update_booking(&mut self, booking: Booking) -> Result<()> {
        self.ensure_locked(RowKey::Booking(booking.id))?;
        self.staged.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if !this.staged.is_empty() {
            let rows = this.staged.len();
            this.backend.apply(this.staged).await?;
            tracing::trace!(rows, locks = this.held.len(), "unit of work committed");
        }
        // Locks are released only after the writes are visible.
        drop(this.held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        tracing::trace!(
            rows = self.staged.len(),
            locks = self.held.len(),
            "unit of work rolled back"
        );
    }
}

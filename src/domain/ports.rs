use super::booking::{Booking, NewBooking};
use super::class::{Class, NewClass};
use super::ids::{BookingId, ClassId, MembershipId, PaymentId, UserId};
use super::membership::{Membership, NewMembership};
use super::notification::Notification;
use super::payment::{NewPayment, Payment};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Transactional storage for classes, bookings, memberships and payments.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a unit of work. Nothing it stages is visible to anyone else
    /// until [`UnitOfWork::commit`] returns.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// An all-or-nothing set of reads and writes.
///
/// `lock_*` methods take an exclusive lock on one row, held until the unit
/// of work commits or is dropped; they return the freshest committed state of
/// that row. Updating an existing row requires holding its lock. Dropping a
/// unit of work without committing discards everything it staged.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn class(&mut self, id: ClassId) -> Result<Option<Class>>;
    async fn booking(&mut self, id: BookingId) -> Result<Option<Booking>>;
    async fn membership(&mut self, id: MembershipId) -> Result<Option<Membership>>;
    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    /// Number of bookings holding a seat (confirmed or completed) in `class`.
    async fn occupied_seats(&mut self, class: ClassId) -> Result<u32>;
    /// The booking through which `user` holds a seat in `class`, if any.
    async fn seat_of(&mut self, user: UserId, class: ClassId) -> Result<Option<Booking>>;
    async fn bookings_for_user(&mut self, user: UserId) -> Result<Vec<Booking>>;
    async fn booking_for_payment(&mut self, payment: PaymentId) -> Result<Option<Booking>>;

    /// Memberships of `user` still marked active, soonest end first. Some may
    /// already be past their end time.
    async fn active_memberships(&mut self, user: UserId) -> Result<Vec<Membership>>;
    async fn memberships_for_user(&mut self, user: UserId) -> Result<Vec<Membership>>;
    async fn membership_for_payment(&mut self, payment: PaymentId) -> Result<Option<Membership>>;
    /// Active memberships whose end time is before `now`.
    async fn lapsed_memberships(&mut self, now: DateTime<Utc>) -> Result<Vec<MembershipId>>;

    async fn lock_class(&mut self, id: ClassId) -> Result<Option<Class>>;
    async fn lock_booking(&mut self, id: BookingId) -> Result<Option<Booking>>;
    async fn lock_membership(&mut self, id: MembershipId) -> Result<Option<Membership>>;
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    async fn insert_class(&mut self, class: NewClass) -> Result<Class>;
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;
    async fn insert_membership(&mut self, membership: NewMembership) -> Result<Membership>;
    async fn insert_booking(&mut self, booking: NewBooking, now: DateTime<Utc>)
    -> Result<Booking>;

    async fn update_class(&mut self, class: Class) -> Result<()>;
    async fn update_payment(&mut self, payment: Payment) -> Result<()>;
    async fn update_membership(&mut self, membership: Membership) -> Result<()>;
    async fn update_booking(&mut self, booking: Booking) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>);
}

/// Fire-and-forget delivery of member notifications (email, push, ...).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;

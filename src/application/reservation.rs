use super::admission::{Admission, CapacityController};
use super::attempt::{bounded, retry_once};
use super::entitlement::EntitlementResolver;
use super::notifier::Notifier;
use crate::domain::booking::{Booking, BookingStatus, NewBooking};
use crate::domain::class::Class;
use crate::domain::ids::{BookingId, ClassId, PaymentId, UserId};
use crate::domain::membership::Membership;
use crate::domain::notification::Notification;
use crate::domain::ports::LedgerStoreRef;
use crate::error::{BookingError, Entity, Result};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Books, cancels and completes class reservations.
///
/// Every call runs in one unit of work. The class row lock serializes
/// admissions per class; memberships and payments are locked as the
/// entitlement resolver reaches them, so locks are always taken in the order
/// class, memberships, payment.
#[derive(Clone)]
pub struct ReservationService {
    store: LedgerStoreRef,
    admission: CapacityController,
    entitlements: EntitlementResolver,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
}

impl ReservationService {
    pub fn new(
        store: LedgerStoreRef,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            admission: CapacityController,
            entitlements: EntitlementResolver::new(clock.clone()),
            notifier,
            clock,
            operation_timeout,
        }
    }

    /// Reserves a seat in `class` for `user`, paid by a membership or, failing
    /// that, by `payment`.
    ///
    /// A store failure is retried once. The confirmation notification is sent
    /// after commit and never affects the result.
    pub async fn create_booking(
        &self,
        user: UserId,
        class: ClassId,
        payment: Option<PaymentId>,
    ) -> Result<Booking> {
        let (booking, class) = bounded(
            self.operation_timeout,
            retry_once("create_booking", || self.try_create(user, class, payment)),
        )
        .await?;

        tracing::info!(
            booking = %booking.id,
            %user,
            class = %class.id,
            consumption = ?booking.consumption,
            "booking confirmed"
        );
        self.notifier
            .send(Notification::booking_confirmed(&booking, &class));
        Ok(booking)
    }

    async fn try_create(
        &self,
        user: UserId,
        class_id: ClassId,
        payment: Option<PaymentId>,
    ) -> Result<(Booking, Class)> {
        let mut uow = self.store.begin().await?;

        let class = uow
            .lock_class(class_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Class, class_id))?;

        let admission = self.admission.try_admit(uow.as_mut(), class_id).await?;
        if admission == Admission::CapacityExceeded {
            return Err(BookingError::ClassFull(class_id.0));
        }
        if uow.seat_of(user, class_id).await?.is_some() {
            return Err(BookingError::AlreadyBooked(class_id.0));
        }

        let consumption = match self
            .entitlements
            .resolve_and_consume(uow.as_mut(), user, class_id, payment)
            .await
        {
            Ok(consumption) => consumption,
            Err(e) if e.is_rejection() => {
                // Keep the lapsed memberships the resolver expired on the way.
                uow.commit().await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let booking = uow
            .insert_booking(
                NewBooking {
                    user,
                    class: class_id,
                    consumption,
                },
                self.clock.utc(),
            )
            .await?;

        match uow.commit().await {
            Ok(()) => Ok((booking, class)),
            Err(BookingError::StoreFailure(reason)) => {
                // The write may have landed anyway; the id tells.
                let mut check = self.store.begin().await?;
                match check.booking(booking.id).await? {
                    Some(stored) => {
                        tracing::warn!(
                            booking = %booking.id,
                            %reason,
                            "commit reported failure but booking exists"
                        );
                        Ok((stored, class))
                    }
                    None => Err(BookingError::StoreFailure(reason)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels `booking` on behalf of `user`.
    ///
    /// A booking owned by someone else is reported as not found. Credits and
    /// payments consumed by the booking are not given back.
    pub async fn cancel_booking(
        &self,
        booking: BookingId,
        user: UserId,
        reason: Option<String>,
    ) -> Result<Booking> {
        let (booking, class) = bounded(
            self.operation_timeout,
            retry_once("cancel_booking", || {
                self.try_cancel(booking, user, reason.clone())
            }),
        )
        .await?;

        tracing::info!(booking = %booking.id, %user, "booking cancelled");
        if let Some(class) = class {
            self.notifier
                .send(Notification::booking_cancelled(&booking, &class));
        }
        Ok(booking)
    }

    async fn try_cancel(
        &self,
        id: BookingId,
        user: UserId,
        reason: Option<String>,
    ) -> Result<(Booking, Option<Class>)> {
        let mut uow = self.store.begin().await?;

        let mut booking = uow
            .lock_booking(id)
            .await?
            .filter(|b| b.user == user)
            .ok_or_else(|| BookingError::not_found(Entity::Booking, id))?;
        booking.cancel(reason, self.clock.utc())?;
        uow.update_booking(booking.clone()).await?;
        let class = uow.class(booking.class).await?;

        match uow.commit().await {
            Ok(()) => Ok((booking, class)),
            Err(BookingError::StoreFailure(reason)) => {
                let mut check = self.store.begin().await?;
                match check.booking(id).await? {
                    Some(stored) if stored.status == BookingStatus::Cancelled => {
                        tracing::warn!(
                            booking = %id,
                            %reason,
                            "commit reported failure but cancellation exists"
                        );
                        Ok((stored, class))
                    }
                    _ => Err(BookingError::StoreFailure(reason)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Records attendance: a confirmed booking becomes completed and keeps
    /// its seat.
    pub async fn complete_booking(&self, id: BookingId) -> Result<Booking> {
        bounded(self.operation_timeout, async {
            let mut uow = self.store.begin().await?;
            let mut booking = uow
                .lock_booking(id)
                .await?
                .ok_or_else(|| BookingError::not_found(Entity::Booking, id))?;
            booking.complete(self.clock.utc())?;
            uow.update_booking(booking.clone()).await?;
            uow.commit().await?;
            tracing::info!(booking = %id, "booking completed");
            Ok(booking)
        })
        .await
    }

    /// All bookings of `user` in any state, oldest first.
    pub async fn bookings_for_user(&self, user: UserId) -> Result<Vec<Booking>> {
        let mut uow = self.store.begin().await?;
        let bookings = uow.bookings_for_user(user).await?;
        uow.rollback().await;
        Ok(bookings)
    }

    /// The membership a booking by `user` would spend right now.
    pub async fn preview(&self, user: UserId) -> Result<Option<Membership>> {
        let mut uow = self.store.begin().await?;
        let membership = self.entitlements.preview(uow.as_mut(), user).await?;
        uow.rollback().await;
        Ok(membership)
    }
}

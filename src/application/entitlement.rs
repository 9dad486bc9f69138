use crate::domain::booking::Consumption;
use crate::domain::ids::{ClassId, PaymentId, UserId};
use crate::domain::membership::{Debit, Membership};
use crate::domain::payment::Payment;
use crate::domain::ports::UnitOfWork;
use crate::error::{BookingError, Entity, Result};
use mockable::Clock;
use std::sync::Arc;

/// Finds what pays for a booking and consumes it.
///
/// Memberships are tried first, soonest-ending first, so the entitlement
/// closest to lapsing is used before longer ones. An explicit payment is only
/// looked at when no membership applies.
#[derive(Clone)]
pub struct EntitlementResolver {
    clock: Arc<dyn Clock>,
}

impl EntitlementResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Consumes one entitlement of `user` inside `uow`.
    ///
    /// Every membership examined is locked before it is re-read, and stays
    /// locked until the unit of work ends. Memberships still marked active
    /// past their end time are expired in the same unit of work, whether or
    /// not anything ends up paying; callers commit that on rejection too.
    pub async fn resolve_and_consume(
        &self,
        uow: &mut dyn UnitOfWork,
        user: UserId,
        class: ClassId,
        payment: Option<PaymentId>,
    ) -> Result<Consumption> {
        let now = self.clock.utc();

        for candidate in uow.active_memberships(user).await? {
            let Some(mut membership) = uow.lock_membership(candidate.id).await? else {
                continue;
            };
            let debit = membership.debit(now);
            if debit.changed() {
                uow.update_membership(membership.clone()).await?;
            }
            if debit.authorizes() {
                tracing::debug!(
                    membership = %membership.id,
                    %user,
                    %class,
                    ?debit,
                    "membership consumed"
                );
                return Ok(Consumption::Membership(membership.id));
            }
            if debit == Debit::Lapsed {
                tracing::info!(membership = %membership.id, %user, "expired lapsed membership");
            }
        }

        match payment {
            Some(payment) => self.consume_payment(uow, user, payment).await,
            None => Err(BookingError::NoEntitlement),
        }
    }

    async fn consume_payment(
        &self,
        uow: &mut dyn UnitOfWork,
        user: UserId,
        id: PaymentId,
    ) -> Result<Consumption> {
        claim_payment(uow, user, id).await?;
        tracing::debug!(payment = %id, %user, "payment consumed");
        Ok(Consumption::Payment(id))
    }

    /// The membership a booking by `user` would spend right now, if any.
    ///
    /// Reads only; takes no locks and changes nothing, so the answer may be
    /// stale by the time a booking is attempted.
    pub async fn preview(
        &self,
        uow: &mut dyn UnitOfWork,
        user: UserId,
    ) -> Result<Option<Membership>> {
        let now = self.clock.utc();
        Ok(uow
            .active_memberships(user)
            .await?
            .into_iter()
            .find(|m| m.is_current(now) && m.credits.is_spendable()))
    }
}

/// Locks payment `id` and checks that `user` may spend it: it exists, is
/// theirs, succeeded, and backs neither a booking nor a membership yet.
pub(crate) async fn claim_payment(
    uow: &mut dyn UnitOfWork,
    user: UserId,
    id: PaymentId,
) -> Result<Payment> {
    let payment = uow
        .lock_payment(id)
        .await?
        .ok_or_else(|| BookingError::not_found(Entity::Payment, id))?;

    if payment.user != user {
        return Err(BookingError::PaymentOwnershipMismatch(id.0));
    }
    if !payment.is_successful() {
        return Err(BookingError::PaymentNotSuccessful(id.0));
    }
    if uow.booking_for_payment(id).await?.is_some()
        || uow.membership_for_payment(id).await?.is_some()
    {
        return Err(BookingError::PaymentAlreadyConsumed(id.0));
    }
    Ok(payment)
}

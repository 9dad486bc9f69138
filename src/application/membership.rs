use super::attempt::bounded;
use super::entitlement::claim_payment;
use super::notifier::Notifier;
use crate::domain::ids::{PaymentId, UserId};
use crate::domain::membership::{Membership, NewMembership, Package};
use crate::domain::notification::Notification;
use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Sells memberships against verified payments.
#[derive(Clone)]
pub struct MembershipService {
    store: LedgerStoreRef,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
}

impl MembershipService {
    pub fn new(
        store: LedgerStoreRef,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            operation_timeout,
        }
    }

    /// Issues a membership of `package` to `user`, paid by `payment`.
    ///
    /// The payment must belong to the user, have succeeded, and not already
    /// back a booking or another membership. It stays locked until the new
    /// membership is committed, so two purchases cannot share it.
    pub async fn purchase(
        &self,
        user: UserId,
        package: Package,
        payment: PaymentId,
    ) -> Result<Membership> {
        let (membership, payment) = bounded(self.operation_timeout, async {
            let mut uow = self.store.begin().await?;
            let payment = claim_payment(uow.as_mut(), user, payment).await?;

            let start = self.clock.utc();
            let (end, credits) = package.terms(start)?;
            let membership = uow
                .insert_membership(NewMembership {
                    user,
                    package,
                    credits,
                    start,
                    end,
                    payment: Some(payment.id),
                })
                .await?;
            uow.commit().await?;
            Ok((membership, payment))
        })
        .await?;

        tracing::info!(
            membership = %membership.id,
            %user,
            ?package,
            payment = %payment.id,
            end = %membership.end,
            "membership purchased"
        );
        self.notifier
            .send(Notification::payment_receipt(&membership, &payment));
        Ok(membership)
    }

    /// All memberships of `user`, newest first.
    pub async fn memberships_for_user(&self, user: UserId) -> Result<Vec<Membership>> {
        let mut uow = self.store.begin().await?;
        let memberships = uow.memberships_for_user(user).await?;
        uow.rollback().await;
        Ok(memberships)
    }
}

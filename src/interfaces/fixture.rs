use crate::domain::class::NewClass;
use crate::domain::ids::{ClassId, MembershipId, PaymentId};
use crate::domain::membership::NewMembership;
use crate::domain::payment::NewPayment;
use crate::domain::ports::LedgerStore;
use crate::error::{BookingError, Result};
use serde::Deserialize;
use std::io::Read;

/// Reference data loaded before requests run: the classes on offer, the
/// payments the gateway has verified and memberships issued elsewhere.
#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub classes: Vec<NewClass>,
    #[serde(default)]
    pub payments: Vec<NewPayment>,
    #[serde(default)]
    pub memberships: Vec<NewMembership>,
}

/// Ids assigned to the fixture rows, in file order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Seeded {
    pub classes: Vec<ClassId>,
    pub payments: Vec<PaymentId>,
    pub memberships: Vec<MembershipId>,
}

impl Fixture {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        serde_json::from_reader(source)
            .map_err(|e| BookingError::InvalidInput(format!("invalid fixture: {e}")))
    }

    /// Inserts every row in one unit of work. On an empty store ids start at
    /// 1 in file order; on a persistent store they continue after the
    /// existing rows.
    pub async fn seed(self, store: &dyn LedgerStore) -> Result<Seeded> {
        let mut uow = store.begin().await?;
        let mut seeded = Seeded::default();

        for class in self.classes {
            seeded.classes.push(uow.insert_class(class).await?.id);
        }
        for payment in self.payments {
            seeded.payments.push(uow.insert_payment(payment).await?.id);
        }
        for membership in self.memberships {
            seeded.memberships.push(uow.insert_membership(membership).await?.id);
        }
        uow.commit().await?;

        tracing::info!(
            classes = seeded.classes.len(),
            payments = seeded.payments.len(),
            memberships = seeded.memberships.len(),
            "fixture seeded"
        );
        Ok(seeded)
    }
}

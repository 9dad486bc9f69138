use super::ledger::{ChangeSet, Filter, IdSequences, Ledger, LedgerBackend, Table};
use crate::domain::booking::Booking;
use crate::domain::class::Class;
use crate::domain::ids::{BookingId, ClassId, MembershipId, PaymentId};
use crate::domain::membership::Membership;
use crate::domain::payment::Payment;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    classes: HashMap<ClassId, Class>,
    payments: HashMap<PaymentId, Payment>,
    memberships: HashMap<MembershipId, Membership>,
    bookings: HashMap<BookingId, Booking>,
}

/// A thread-safe in-memory ledger backend.
///
/// All four tables sit behind one `RwLock`, so a commit is a single write
/// critical section and readers never observe half of one. Ideal for
/// testing or deployments where persistence is not required.
#[derive(Default)]
pub struct InMemoryBackend {
    tables: RwLock<Tables>,
    sequences: IdSequences,
}

impl InMemoryBackend {
    /// Creates a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

pub type InMemoryLedger = Ledger<InMemoryBackend>;

impl Ledger<InMemoryBackend> {
    pub fn in_memory(lock_timeout: Duration) -> Self {
        Ledger::new(InMemoryBackend::new(), lock_timeout)
    }
}

#[async_trait]
impl LedgerBackend for InMemoryBackend {
    async fn class(&self, id: ClassId) -> Result<Option<Class>> {
        Ok(self.tables.read().await.classes.get(&id).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>> {
        Ok(self.tables.read().await.memberships.get(&id).cloned())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn scan_memberships(&self, filter: Filter<'_, Membership>) -> Result<Vec<Membership>> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .values()
            .filter(|m| filter(m))
            .cloned()
            .collect())
    }

    async fn scan_bookings(&self, filter: Filter<'_, Booking>) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| filter(b))
            .cloned()
            .collect())
    }

    fn next_id(&self, table: Table) -> u64 {
        self.sequences.next(table)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.classes.extend(changes.classes);
        tables.payments.extend(changes.payments);
        tables.memberships.extend(changes.memberships);
        tables.bookings.extend(changes.bookings);
        Ok(())
    }
}

use super::ledger::{ChangeSet, Filter, IdSequences, Ledger, LedgerBackend, Table};
use crate::domain::booking::Booking;
use crate::domain::class::Class;
use crate::domain::ids::{BookingId, ClassId, MembershipId, PaymentId};
use crate::domain::membership::Membership;
use crate::domain::payment::Payment;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Column Family for class records.
pub const CF_CLASSES: &str = "classes";
/// Column Family for payment facts.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for memberships.
pub const CF_MEMBERSHIPS: &str = "memberships";
/// Column Family for bookings.
pub const CF_BOOKINGS: &str = "bookings";

/// A persistent ledger backend using RocksDB.
///
/// Each entity lives in its own Column Family keyed by its big-endian id, so
/// iteration order is id order. Values are JSON. A commit is one `WriteBatch`,
/// which RocksDB applies atomically.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<DB>,
    sequences: Arc<IdSequences>,
}

impl RocksDbBackend {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the four column families exist and resumes id
    /// allocation after the highest stored id of each.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_CLASSES, CF_PAYMENTS, CF_MEMBERSHIPS, CF_BOOKINGS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        let sequences = IdSequences::starting_after(
            last_id(&db, CF_CLASSES)?,
            last_id(&db, CF_PAYMENTS)?,
            last_id(&db, CF_MEMBERSHIPS)?,
            last_id(&db, CF_BOOKINGS)?,
        );

        Ok(Self {
            db: Arc::new(db),
            sequences: Arc::new(sequences),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        column_family(&self.db, name)
    }

    fn get<T: DeserializeOwned>(&self, name: &str, id: u64) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        match self.db.get_pinned_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, name: &str, filter: Filter<'_, T>) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let row: T = serde_json::from_slice(&value)?;
            if filter(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn stage<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        name: &str,
        id: u64,
        row: &T,
    ) -> Result<()> {
        let cf = self.cf(name)?;
        batch.put_cf(cf, id.to_be_bytes(), serde_json::to_vec(row)?);
        Ok(())
    }
}

fn column_family<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| BookingError::StoreFailure(format!("{name} column family not found")))
}

fn last_id(db: &DB, name: &str) -> Result<u64> {
    let cf = column_family(db, name)?;
    match db.iterator_cf(cf, IteratorMode::End).next() {
        Some(item) => {
            let (key, _value) = item?;
            let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                BookingError::StoreFailure(format!("malformed key in {name} column family"))
            })?;
            Ok(u64::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub type RocksDbLedger = Ledger<RocksDbBackend>;

impl Ledger<RocksDbBackend> {
    pub fn open_rocksdb<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Result<Self> {
        Ok(Ledger::new(RocksDbBackend::open(path)?, lock_timeout))
    }
}

#[async_trait]
impl LedgerBackend for RocksDbBackend {
    async fn class(&self, id: ClassId) -> Result<Option<Class>> {
        self.get(CF_CLASSES, id.0)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, id.0)
    }

    async fn membership(&self, id: MembershipId) -> Result<Option<Membership>> {
        self.get(CF_MEMBERSHIPS, id.0)
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        self.get(CF_BOOKINGS, id.0)
    }

    async fn scan_memberships(&self, filter: Filter<'_, Membership>) -> Result<Vec<Membership>> {
        self.scan(CF_MEMBERSHIPS, filter)
    }

    async fn scan_bookings(&self, filter: Filter<'_, Booking>) -> Result<Vec<Booking>> {
        self.scan(CF_BOOKINGS, filter)
    }

    fn next_id(&self, table: Table) -> u64 {
        self.sequences.next(table)
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (id, class) in &changes.classes {
            self.stage(&mut batch, CF_CLASSES, id.0, class)?;
        }
        for (id, payment) in &changes.payments {
            self.stage(&mut batch, CF_PAYMENTS, id.0, payment)?;
        }
        for (id, membership) in &changes.memberships {
            self.stage(&mut batch, CF_MEMBERSHIPS, id.0, membership)?;
        }
        for (id, booking) in &changes.bookings {
            self.stage(&mut batch, CF_BOOKINGS, id.0, booking)?;
        }
        self.db.write(batch)?;
        Ok(())
    }
}

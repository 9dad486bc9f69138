//! Adapters behind the domain ports: the ledger (row locks, staged units of
//! work) over in-memory or RocksDB backends, and notification sinks.

pub mod in_memory;
pub mod ledger;
pub mod locks;
pub mod notify;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

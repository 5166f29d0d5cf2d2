// hkv-engine - Typed in-memory keyspace, expiration, and snapshot persistence

pub mod entry;
pub mod expiration;
pub mod keyspace;
pub mod snapshot;
pub mod value;

pub use entry::Entry;
pub use expiration::ExpirationTimers;
pub use keyspace::{glob_match, now_epoch, Keyspace, TtlStatus};
pub use snapshot::SnapshotEngine;
pub use value::{Kind, OrderedF64, Value};

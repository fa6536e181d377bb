//! facegate-store — Persistence of enrolled identities.
//!
//! The identity list is kept as one JSON array under a fixed key of a
//! key-value medium. SQLite provides the durable medium; an in-memory
//! medium backs tests and ephemeral sessions.

mod codec;
pub mod kv_store;
pub mod medium;
pub mod sqlite;

pub use kv_store::{KvIdentityStore, IDENTITIES_KEY};
pub use medium::{KvMedium, MemoryMedium};
pub use sqlite::SqliteMedium;

/// Identity store persisted in a SQLite database file.
pub type SqliteIdentityStore = KvIdentityStore<SqliteMedium>;

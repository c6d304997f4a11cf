//! Durable event cache for Beacon.
//!
//! This crate provides:
//! - `Event`: a collection name plus an opaque JSON payload, truncated to
//!   wire limits on construction
//! - `Fingerprint`: the reversible string key that deduplicates events
//! - `EventCache`: the durable-store contract the outbox depends on
//! - `SqliteEventCache`: single-file SQLite implementation
//! - `MemoryEventCache`: process-memory implementation of the same contract
//!
//! # Failure model
//!
//! Cache operations never return errors to the caller. Storage faults are
//! logged and surface as `false` or an empty batch, and a cache that failed to
//! open reports `ready() == false` forever. Callers treat a cache that is not
//! ready as "caching disabled".

mod error;
mod event;
mod fingerprint;
mod memory;
mod migrations;
mod provider;
mod sqlite;

pub use error::{CacheError, CacheResult};
pub use event::{Event, MAX_NAME_CHARS, MAX_PAYLOAD_CHARS};
pub use fingerprint::{Fingerprint, FINGERPRINT_SEPARATOR, MAX_FINGERPRINT_CHARS};
pub use memory::MemoryEventCache;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use provider::EventCache;
pub use sqlite::SqliteEventCache;

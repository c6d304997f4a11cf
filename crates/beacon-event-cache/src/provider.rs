//! The durable-store contract.

use crate::Event;

/// Durable store of events waiting to be redelivered.
///
/// Entries are keyed by [`Fingerprint`](crate::Fingerprint) and carry an
/// attempts counter. Each method is atomic on its own; a `read` followed by a
/// `remove` is not, and callers must tolerate an entry vanishing in between.
///
/// Implementations swallow storage faults: they log them and report `false` or
/// an empty batch. After [`close`](EventCache::close) every operation is a
/// no-op.
pub trait EventCache: Send + Sync {
    /// Insert the event with one attempt, or bump the attempts of its existing
    /// entry. Returns `false` if the event could not be stored.
    fn write(&self, event: &Event) -> bool;

    /// Delete the event's entry. Returns `false` if there was none or the
    /// delete failed; both are safe to ignore.
    fn remove(&self, event: &Event) -> bool;

    /// Whether an entry exists for the event.
    fn exists(&self, event: &Event) -> bool;

    /// Random sample of up to `count` cached events with fewer than
    /// `max_attempts` attempts (`0` disables the ceiling). Does not touch the
    /// attempts counters. Order is unspecified.
    fn read(&self, count: usize, max_attempts: u32) -> Vec<Event>;

    /// Whether the store is open and its schema is in place.
    fn ready(&self) -> bool;

    /// Release the underlying storage. Idempotent.
    fn close(&self);

    /// Number of cached entries, including those past the attempts ceiling.
    fn pending_count(&self) -> usize;
}

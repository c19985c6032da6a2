//! Store module: event records, leases, retry policy, and the in-memory store.

mod filter;
mod journal;
mod memory;
mod record;
mod retry;

pub use filter::EventFilter;
pub use journal::Journal;
pub use memory::InMemoryEventStore;
pub use record::{EventRecord, Lease};
pub use retry::RetryPolicy;

//! EventStore port: the source of truth for events and their processing status.
//!
//! Every status transition goes through the store, which serializes them with
//! optimistic concurrency on the record version. Workers never hold a store lock
//! while a handler runs; they hold a [`Lease`] instead, and every write made under
//! a lease is rejected with `LeaseLost` once that lease is gone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::status::EventCounts;
use crate::domain::{ActionResult, EngineError, Event, EventId, RuleId};
use crate::store::{EventFilter, EventRecord, Lease};

/// How an attempt ends, as applied by [`EventStore::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed,
    Retry {
        next_attempt_at: DateTime<Utc>,
        reason: String,
    },
    Failed {
        reason: String,
    },
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists a new pending event. Durable once this returns `Ok`.
    async fn append(&self, event: Event) -> Result<(), EngineError>;

    async fn get(&self, id: EventId) -> Result<Option<EventRecord>, EngineError>;

    /// Events matching `filter`, oldest id first.
    async fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, EngineError>;

    /// Pending events claimable at `now`, in (next_attempt_at, id) order.
    async fn candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(EventId, u64)>, EngineError>;

    /// Compare-and-swap claim: pending -> processing iff the record is still at
    /// `expected_version`. Losers get `LeaseConflict`.
    async fn try_claim(
        &self,
        id: EventId,
        expected_version: u64,
        lease: Lease,
    ) -> Result<Event, EngineError>;

    /// Extends a live lease while its worker is still running handlers.
    /// Fails with `LeaseLost` once the lease has been reaped or replaced.
    async fn renew_lease(&self, lease: &Lease, expires_at: DateTime<Utc>)
    -> Result<(), EngineError>;

    /// Records rule matches for this attempt; returns the rules not matched before.
    async fn record_matches(
        &self,
        lease: &Lease,
        rules: &[RuleId],
    ) -> Result<Vec<RuleId>, EngineError>;

    /// Stores one action result. Returns `false` if the slot had already succeeded.
    async fn record_action(&self, lease: &Lease, result: ActionResult)
    -> Result<bool, EngineError>;

    /// Ends the attempt and releases the lease.
    async fn finalize(
        &self,
        lease: &Lease,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<Event, EngineError>;

    /// Returns events whose lease expired before `now` to pending.
    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<Vec<EventId>, EngineError>;

    /// Operator replay: failed -> pending.
    async fn replay(&self, id: EventId, now: DateTime<Utc>) -> Result<Event, EngineError>;

    async fn counts(&self) -> Result<EventCounts, EngineError>;
}

//! Event record: the event plus the store's bookkeeping (version, lease, schedule).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, Event, EventId, EventStatus, LeaseId};

/// An exclusive, time-bounded claim on one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub event_id: EventId,
    pub worker: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Single source of truth for one event inside a store.
///
/// `version` increases on every mutation; claims compare-and-swap on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: Event,
    pub version: u64,
    #[serde(default)]
    pub lease: Option<Lease>,
    /// Earliest time the event may be claimed (backoff gate).
    pub next_attempt_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(event: Event) -> Self {
        let next_attempt_at = event.timestamp();
        Self {
            event,
            version: 1,
            lease: None,
            next_attempt_at,
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.event.status().is_claimable() && self.next_attempt_at <= now
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    /// Compare-and-swap claim: only a pending record at `expected_version` can be claimed.
    pub(crate) fn claim(&mut self, expected_version: u64, lease: Lease) -> Result<(), EngineError> {
        let event_id = self.event.id();
        if self.version != expected_version || !self.event.status().is_claimable() {
            return Err(EngineError::LeaseConflict {
                event_id,
                expected: expected_version,
                actual: self.version,
            });
        }
        self.event.mark_processing()?;
        self.lease = Some(lease);
        self.bump();
        Ok(())
    }

    /// Fails with `LeaseLost` unless `lease` is the live lease on this record.
    pub(crate) fn check_lease(&self, lease: &Lease) -> Result<(), EngineError> {
        match &self.lease {
            Some(held)
                if held.id == lease.id && self.event.status() == EventStatus::Processing =>
            {
                Ok(())
            }
            _ => Err(EngineError::LeaseLost(self.event.id())),
        }
    }

    /// Pushes the live lease's expiry out to `expires_at`; never pulls it in.
    pub(crate) fn renew(
        &mut self,
        lease: &Lease,
        expires_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, EngineError> {
        self.check_lease(lease)?;
        let event_id = self.event.id();
        let held = self.lease.as_mut().ok_or(EngineError::LeaseLost(event_id))?;
        if expires_at > held.expires_at {
            held.expires_at = expires_at;
        }
        Ok(held.expires_at)
    }

    /// Applies `f` to the event under `lease`, bumping the version on success.
    pub(crate) fn update<T>(
        &mut self,
        lease: &Lease,
        f: impl FnOnce(&mut Event) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.check_lease(lease)?;
        let out = f(&mut self.event)?;
        self.bump();
        Ok(out)
    }

    pub(crate) fn complete(&mut self, lease: &Lease, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.update(lease, |e| e.mark_completed(at))?;
        self.lease = None;
        Ok(())
    }

    pub(crate) fn fail(
        &mut self,
        lease: &Lease,
        at: DateTime<Utc>,
        reason: String,
    ) -> Result<(), EngineError> {
        self.update(lease, |e| e.mark_failed(at, reason))?;
        self.lease = None;
        Ok(())
    }

    pub(crate) fn schedule_retry(
        &mut self,
        lease: &Lease,
        next_attempt_at: DateTime<Utc>,
        reason: String,
    ) -> Result<(), EngineError> {
        self.update(lease, |e| e.mark_retry(reason))?;
        self.lease = None;
        self.next_attempt_at = next_attempt_at;
        Ok(())
    }

    /// Drops an expired lease and makes the event claimable again.
    pub(crate) fn reap(&mut self, now: DateTime<Utc>) -> Result<bool, EngineError> {
        let expired = self.lease.as_ref().is_some_and(|l| l.is_expired(now));
        if !expired {
            return Ok(false);
        }
        self.event.release("lease expired before processing finished".to_string())?;
        self.lease = None;
        self.next_attempt_at = now;
        self.bump();
        Ok(true)
    }

    /// Used when restoring from a journal: leases do not survive a restart.
    pub(crate) fn recover(&mut self, now: DateTime<Utc>) -> Result<bool, EngineError> {
        if self.event.status() != EventStatus::Processing {
            return Ok(false);
        }
        self.event.release("recovered after restart".to_string())?;
        self.lease = None;
        self.next_attempt_at = now;
        self.bump();
        Ok(true)
    }

    pub(crate) fn replay(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.event.mark_replayed()?;
        self.next_attempt_at = now;
        self.bump();
        Ok(())
    }
}

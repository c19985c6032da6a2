//! In-process event store with an optional durable journal.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{EventFilter, EventRecord, Journal, Lease};
use crate::app::status::EventCounts;
use crate::domain::{ActionResult, EngineError, Event, EventId, EventStatus, RuleId};
use crate::ports::event_store::{EventStore, Resolution};

#[derive(Default)]
struct StoreState {
    /// Single source of truth for every event.
    records: HashMap<EventId, EventRecord>,
}

impl StoreState {
    fn record_mut(&mut self, id: EventId) -> Result<&mut EventRecord, EngineError> {
        self.records
            .get_mut(&id)
            .ok_or(EngineError::EventNotFound(id))
    }

    fn counts(&self) -> EventCounts {
        let mut counts = EventCounts::default();
        for record in self.records.values() {
            match record.event.status() {
                EventStatus::Pending => counts.pending += 1,
                EventStatus::Processing => counts.processing += 1,
                EventStatus::Completed => counts.completed += 1,
                EventStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Event store backed by a `HashMap`.
///
/// The state mutex is only held for the in-memory mutation; journal writes happen
/// after it is released.
pub struct InMemoryEventStore {
    state: Mutex<StoreState>,
    journal: Option<Journal>,
}

impl InMemoryEventStore {
    /// A volatile store. Events are lost when the process exits.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            journal: None,
        }
    }

    /// A store persisted to a journal at `path`, restoring whatever it already holds.
    ///
    /// Events found in `processing` lost their worker with the previous process and
    /// are put back to `pending`.
    pub async fn open(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Self, EngineError> {
        let (journal, restored) = Journal::open(path).await?;

        let mut recovered = Vec::new();
        let mut state = StoreState::default();
        for mut record in restored {
            if record.recover(now)? {
                recovered.push(record.clone());
            }
            state.records.insert(record.event.id(), record);
        }
        for record in &recovered {
            journal.append(record).await?;
        }

        info!(
            path = %journal.path().display(),
            events = state.records.len(),
            recovered = recovered.len(),
            "event store restored from journal"
        );

        Ok(Self {
            state: Mutex::new(state),
            journal: Some(journal),
        })
    }

    async fn persist(&self, record: &EventRecord) -> Result<(), EngineError> {
        match &self.journal {
            Some(journal) => journal.append(record).await,
            None => Ok(()),
        }
    }

    /// Runs `f` against one record under the state lock, then journals the result.
    async fn mutate<T>(
        &self,
        id: EventId,
        f: impl FnOnce(&mut EventRecord) -> Result<T, EngineError>,
    ) -> Result<(T, EventRecord), EngineError> {
        let (out, snapshot) = {
            let mut state = self.state.lock().await;
            let record = state.record_mut(id)?;
            let out = f(record)?;
            (out, record.clone())
        };
        self.persist(&snapshot).await?;
        Ok((out, snapshot))
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) -> Result<(), EngineError> {
        let id = event.id();
        if self.state.lock().await.records.contains_key(&id) {
            return Err(EngineError::Validation(format!("duplicate event id {id}")));
        }

        let record = EventRecord::new(event);
        // journal first: an acknowledged event must survive a crash
        self.persist(&record).await?;
        self.state.lock().await.records.insert(id, record);
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Option<EventRecord>, EngineError> {
        Ok(self.state.lock().await.records.get(&id).cloned())
    }

    async fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, EngineError> {
        let state = self.state.lock().await;
        let mut events: Vec<Event> = state
            .records
            .values()
            .filter(|r| filter.matches(&r.event))
            .map(|r| r.event.clone())
            .collect();
        events.sort_by_key(Event::id);
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn candidates(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(EventId, u64)>, EngineError> {
        let state = self.state.lock().await;
        let mut eligible: Vec<&EventRecord> = state
            .records
            .values()
            .filter(|r| r.is_eligible(now))
            .collect();
        eligible.sort_by_key(|r| (r.next_attempt_at, r.event.id()));
        Ok(eligible
            .into_iter()
            .take(limit)
            .map(|r| (r.event.id(), r.version))
            .collect())
    }

    async fn try_claim(
        &self,
        id: EventId,
        expected_version: u64,
        lease: Lease,
    ) -> Result<Event, EngineError> {
        let worker = lease.worker.clone();
        let (_, snapshot) = self
            .mutate(id, |record| record.claim(expected_version, lease))
            .await?;
        debug!(event_id = %id, worker = %worker, version = snapshot.version, "event claimed");
        Ok(snapshot.event)
    }

    async fn record_matches(
        &self,
        lease: &Lease,
        rules: &[RuleId],
    ) -> Result<Vec<RuleId>, EngineError> {
        let (fresh, _) = self
            .mutate(lease.event_id, |record| {
                record.update(lease, |event| Ok(event.note_matched(rules)))
            })
            .await?;
        Ok(fresh)
    }

    async fn renew_lease(
        &self,
        lease: &Lease,
        expires_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        // leases never outlive the process, so renewals are not journaled
        let mut state = self.state.lock().await;
        let expires_at = state.record_mut(lease.event_id)?.renew(lease, expires_at)?;
        debug!(event_id = %lease.event_id, %expires_at, "lease renewed");
        Ok(())
    }

    async fn record_action(
        &self,
        lease: &Lease,
        result: ActionResult,
    ) -> Result<bool, EngineError> {
        let (stored, _) = self
            .mutate(lease.event_id, |record| {
                record.update(lease, |event| Ok(event.record_result(result)))
            })
            .await?;
        Ok(stored)
    }

    async fn finalize(
        &self,
        lease: &Lease,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<Event, EngineError> {
        let (_, snapshot) = self
            .mutate(lease.event_id, |record| match resolution {
                Resolution::Completed => record.complete(lease, now),
                Resolution::Retry {
                    next_attempt_at,
                    reason,
                } => record.schedule_retry(lease, next_attempt_at, reason),
                Resolution::Failed { reason } => record.fail(lease, now, reason),
            })
            .await?;
        Ok(snapshot.event)
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<Vec<EventId>, EngineError> {
        let reaped: Vec<EventRecord> = {
            let mut state = self.state.lock().await;
            let mut reaped = Vec::new();
            for record in state.records.values_mut() {
                if record.reap(now)? {
                    reaped.push(record.clone());
                }
            }
            reaped
        };

        for record in &reaped {
            warn!(event_id = %record.event.id(), "lease expired; event returned to pending");
            self.persist(record).await?;
        }
        Ok(reaped.iter().map(|r| r.event.id()).collect())
    }

    async fn replay(&self, id: EventId, now: DateTime<Utc>) -> Result<Event, EngineError> {
        let (_, snapshot) = self.mutate(id, |record| record.replay(now)).await?;
        Ok(snapshot.event)
    }

    async fn counts(&self) -> Result<EventCounts, EngineError> {
        Ok(self.state.lock().await.counts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActionOutcome, ActionSlot, EventType, LeaseId, OutcomeKind, Payload,
    };
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(secs: i64) -> Event {
        Event::new(
            EventId::from_ulid(Ulid::new()),
            EventType::CreatorRegistered,
            at(secs),
            Payload::new(),
            "creator",
            "c-1",
            None,
        )
    }

    fn lease_for(id: EventId, worker: &str, expires_at: DateTime<Utc>) -> Lease {
        Lease {
            id: LeaseId::from_ulid(Ulid::new()),
            event_id: id,
            worker: worker.into(),
            expires_at,
        }
    }

    async fn claim(store: &InMemoryEventStore, id: EventId, expires_at: DateTime<Utc>) -> Lease {
        let version = store.get(id).await.unwrap().unwrap().version;
        let lease = lease_for(id, "w-1", expires_at);
        store.try_claim(id, version, lease.clone()).await.unwrap();
        lease
    }

    #[tokio::test]
    async fn append_and_counts() {
        let store = InMemoryEventStore::new();
        store.append(event(0)).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 0);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryEventStore::new();
        let e = event(0);
        store.append(e.clone()).await.unwrap();
        let err = store.append(e).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn candidates_respect_backoff_and_order() {
        let store = InMemoryEventStore::new();
        let first = event(0);
        let second = event(5);
        let later = event(100);
        for e in [later.clone(), second.clone(), first.clone()] {
            store.append(e).await.unwrap();
        }

        let ids: Vec<EventId> = store
            .candidates(at(10), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![first.id(), second.id()]);
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let e = event(0);
        store.append(e.clone()).await.unwrap();
        let version = store.get(e.id()).await.unwrap().unwrap().version;

        let mut handles = Vec::new();
        for worker in ["w-1", "w-2", "w-3", "w-4"] {
            let store = Arc::clone(&store);
            let lease = lease_for(e.id(), worker, at(60));
            handles.push(tokio::spawn(async move {
                store.try_claim(lease.event_id, version, lease).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(err) => assert!(matches!(err, EngineError::LeaseConflict { .. })),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.counts().await.unwrap().processing, 1);
    }

    #[tokio::test]
    async fn action_results_require_the_live_lease() {
        let store = InMemoryEventStore::new();
        let e = event(0);
        store.append(e.clone()).await.unwrap();
        let lease = claim(&store, e.id(), at(60)).await;

        let slot = ActionSlot::new(RuleId::new(1), "log_event");
        let result = ActionResult::new(slot, ActionOutcome::success(), at(1), 1);
        assert!(store.record_action(&lease, result.clone()).await.unwrap());

        let stranger = lease_for(e.id(), "w-2", at(60));
        let err = store.record_action(&stranger, result).await.unwrap_err();
        assert!(matches!(err, EngineError::LeaseLost(_)));
    }

    #[tokio::test]
    async fn finalize_retry_then_reclaim_after_delay() {
        let store = InMemoryEventStore::new();
        let e = event(0);
        store.append(e.clone()).await.unwrap();
        let lease = claim(&store, e.id(), at(60)).await;

        let after = store
            .finalize(
                &lease,
                Resolution::Retry {
                    next_attempt_at: at(30),
                    reason: "flaky".into(),
                },
                at(1),
            )
            .await
            .unwrap();
        assert_eq!(after.status(), EventStatus::Pending);
        assert_eq!(after.retry_count(), 1);

        assert!(store.candidates(at(29), 10).await.unwrap().is_empty());
        assert_eq!(store.candidates(at(30), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reaper_returns_expired_leases_to_pending() {
        let store = InMemoryEventStore::new();
        let e = event(0);
        store.append(e.clone()).await.unwrap();
        let lease = claim(&store, e.id(), at(0) + Duration::seconds(30)).await;

        assert!(store.reap_expired(at(10)).await.unwrap().is_empty());
        assert_eq!(store.reap_expired(at(31)).await.unwrap(), vec![e.id()]);

        let err = store
            .finalize(&lease, Resolution::Completed, at(32))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LeaseLost(_)));
        assert_eq!(store.counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn list_filters_and_limits() {
        let store = InMemoryEventStore::new();
        for secs in 0..5 {
            store.append(event(secs)).await.unwrap();
        }
        let all = store.list(&EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 5);

        let limited = store
            .list(&EventFilter {
                limit: Some(2),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited, all[..2].to_vec());

        let failed = store
            .list(&EventFilter::with_status(EventStatus::Failed))
            .await
            .unwrap();
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn journal_restores_events_and_recovers_in_flight_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let done = event(0);
        let in_flight = event(1);
        {
            let store = InMemoryEventStore::open(&path, at(2)).await.unwrap();
            store.append(done.clone()).await.unwrap();
            store.append(in_flight.clone()).await.unwrap();

            let lease = claim(&store, done.id(), at(60)).await;
            let slot = ActionSlot::new(RuleId::new(1), "log_event");
            store
                .record_action(&lease, ActionResult::new(slot, ActionOutcome::success(), at(3), 1))
                .await
                .unwrap();
            store.finalize(&lease, Resolution::Completed, at(3)).await.unwrap();

            claim(&store, in_flight.id(), at(60)).await;
        }

        let store = InMemoryEventStore::open(&path, at(10)).await.unwrap();
        let restored = store.get(done.id()).await.unwrap().unwrap().event;
        assert_eq!(restored.status(), EventStatus::Completed);
        assert_eq!(
            restored.result_for("log_event").unwrap().outcome,
            OutcomeKind::Success
        );

        let recovered = store.get(in_flight.id()).await.unwrap().unwrap();
        assert_eq!(recovered.event.status(), EventStatus::Pending);
        assert!(recovered.lease.is_none());
        assert!(recovered.is_eligible(at(10)));
    }
}

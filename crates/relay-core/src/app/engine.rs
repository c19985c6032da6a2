//! Engine - event の受付と処理
//!
//! # フロー
//! 1. `emit()` で検証 → EventStore に pending として永続化
//! 2. `claim_next()` で version の CAS により lease を取得
//! 3. RuleMatcher で active rule を決定的な順序で照合
//! 4. Dispatcher で action 実行 → AttemptSummary
//! 5. Decider で Complete / Retry / Fail を決定し `finalize()`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use super::dispatcher::Dispatcher;
use super::status::EventCounts;
use crate::config::EngineConfig;
use crate::domain::{
    Decider, Decision, EngineError, Event, EventId, EventStatus, EventType, Payload, RuleId,
};
use crate::ports::event_store::{EventStore, Resolution};
use crate::ports::{Clock, IdGenerator};
use crate::rules::{RuleMatcher, RuleRegistry};
use crate::store::{EventFilter, Lease};

/// How many candidates a worker looks at per claim round.
const CLAIM_BATCH: usize = 16;

/// The automation engine. Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn EventStore>,
    pub(crate) matcher: RuleMatcher,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) decider: Arc<dyn Decider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) wakeup: Notify,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rule registry, for admin edits.
    pub fn rules(&self) -> &Arc<RuleRegistry> {
        self.matcher.registry()
    }

    /// Records a business event and returns its id without waiting for dispatch.
    ///
    /// The event is durable once this returns `Ok`.
    #[instrument(skip(self, payload), fields(event_id))]
    pub async fn emit(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        source_entity: &str,
        source_id: &str,
        user_id: Option<&str>,
    ) -> Result<EventId, EngineError> {
        let event_type: EventType = event_type.parse()?;
        let serde_json::Value::Object(payload) = payload else {
            return Err(EngineError::Validation(
                "payload must be a JSON object".into(),
            ));
        };
        self.emit_event(event_type, payload, source_entity, source_id, user_id)
            .await
    }

    /// Typed variant of [`Engine::emit`].
    pub async fn emit_event(
        &self,
        event_type: EventType,
        payload: Payload,
        source_entity: &str,
        source_id: &str,
        user_id: Option<&str>,
    ) -> Result<EventId, EngineError> {
        if source_entity.trim().is_empty() || source_id.trim().is_empty() {
            return Err(EngineError::Validation(
                "source_entity and source_id are required".into(),
            ));
        }

        let id = self.ids.event_id();
        tracing::Span::current().record("event_id", tracing::field::display(id));
        let event = Event::new(
            id,
            event_type,
            self.clock.now(),
            payload,
            source_entity,
            source_id,
            user_id.map(str::to_string),
        );
        self.store.append(event).await?;
        self.wakeup.notify_waiters();

        info!(event_id = %id, event_type = %event_type, source_entity, source_id, "event emitted");
        Ok(id)
    }

    /// Claims the oldest eligible event for `worker`. Lost races move on to the
    /// next candidate.
    pub async fn claim_next(&self, worker: &str) -> Result<Option<(Event, Lease)>, EngineError> {
        let now = self.clock.now();
        for (id, version) in self.store.candidates(now, CLAIM_BATCH).await? {
            let lease = Lease {
                id: self.ids.lease_id(),
                event_id: id,
                worker: worker.to_string(),
                expires_at: after(now, self.config.lease_ttl()),
            };
            match self.store.try_claim(id, version, lease.clone()).await {
                Ok(event) => return Ok(Some((event, lease))),
                Err(EngineError::LeaseConflict { .. }) => {
                    debug!(event_id = %id, worker, "lost claim race");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Runs one attempt on an event claimed under `lease` and finalizes it.
    #[instrument(
        skip_all,
        fields(event_id = %event.id(), event_type = %event.event_type(), attempt = event.attempt())
    )]
    pub async fn process(&self, event: Event, lease: Lease) -> Result<Event, EngineError> {
        if event.status() != EventStatus::Processing {
            return Err(EngineError::InvalidTransition {
                event_id: event.id(),
                from: event.status(),
                to: EventStatus::Processing,
            });
        }

        let rules = self.matcher.matching(event.event_type(), event.payload());
        let rule_ids: Vec<RuleId> = rules.iter().map(|r| r.id).collect();
        debug!(matched = rule_ids.len(), "rules matched");

        let fresh = self.store.record_matches(&lease, &rule_ids).await?;
        if !fresh.is_empty() {
            self.rules().record_trigger(&fresh, self.clock.now());
        }

        let summary = self.dispatcher.dispatch(event.clone(), &lease, rules).await?;
        let decision = self.decider.decide(&event, &summary);
        let now = self.clock.now();

        let resolution = match decision {
            Decision::Complete => Resolution::Completed,
            Decision::Retry { delay, reason } => {
                warn!(delay_ms = delay.as_millis() as u64, reason = %reason, "scheduling retry");
                Resolution::Retry {
                    next_attempt_at: after(now, delay),
                    reason,
                }
            }
            Decision::Fail { reason } => Resolution::Failed { reason },
        };

        let done = self.store.finalize(&lease, resolution, now).await?;
        match done.status() {
            EventStatus::Completed => info!(
                invoked = summary.invoked,
                skipped = summary.skipped,
                "event completed"
            ),
            EventStatus::Failed => warn!(
                error = done.error_message().unwrap_or_default(),
                "event failed"
            ),
            _ => {}
        }
        Ok(done)
    }

    /// Claims and processes at most one event. `Ok(false)` means nothing was eligible.
    pub async fn run_once(&self, worker: &str) -> Result<bool, EngineError> {
        let Some((event, lease)) = self.claim_next(worker).await? else {
            return Ok(false);
        };
        match self.process(event, lease).await {
            Ok(_) => Ok(true),
            Err(EngineError::LeaseLost(id)) => {
                warn!(event_id = %id, worker, "lease lost mid-attempt");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Processes events on the calling task until none is eligible right now.
    /// Returns the number of attempts made.
    pub async fn run_until_idle(&self) -> Result<usize, EngineError> {
        let mut attempts = 0;
        while self.run_once("inline").await? {
            attempts += 1;
        }
        Ok(attempts)
    }

    /// Returns events with expired leases to pending.
    pub async fn reap(&self) -> Result<Vec<EventId>, EngineError> {
        let reaped = self.store.reap_expired(self.clock.now()).await?;
        if !reaped.is_empty() {
            self.wakeup.notify_waiters();
        }
        Ok(reaped)
    }

    /// Operator replay of a failed event. Succeeded actions are not run again.
    pub async fn replay(&self, id: EventId) -> Result<Event, EngineError> {
        let event = self.store.replay(id, self.clock.now()).await?;
        self.wakeup.notify_waiters();
        info!(event_id = %id, replay = event.replay_count(), "event replayed");
        Ok(event)
    }

    pub async fn event(&self, id: EventId) -> Result<Event, EngineError> {
        self.store
            .get(id)
            .await?
            .map(|record| record.event)
            .ok_or(EngineError::EventNotFound(id))
    }

    pub async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>, EngineError> {
        self.store.list(filter).await
    }

    pub async fn counts(&self) -> Result<EventCounts, EngineError> {
        self.store.counts().await
    }

    pub(crate) async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

pub(crate) fn after(now: DateTime<Utc>, d: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

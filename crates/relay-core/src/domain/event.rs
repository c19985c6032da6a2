//! Event model: immutable facts plus a mutable processing envelope.
//!
//! Facts (`event_type`, `payload`, `source_*`, ...) are private and only readable
//! through accessors, so they stay write-once. The envelope is changed only by the
//! crate's store through the `pub(crate)` transition methods below, each of which
//! checks the state machine in [`EventStatus`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{ActionId, ActionSlot};
use super::errors::EngineError;
use super::event_type::EventType;
use super::ids::{EventId, RuleId};
use super::outcome::{ActionOutcome, OutcomeKind};
use super::state::EventStatus;

/// Opaque key/value document. Its schema belongs to the emitting domain.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Recorded result of one action slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub rule_id: RuleId,
    pub action: ActionId,
    pub outcome: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub executed_at: DateTime<Utc>,

    /// 1-based processing attempt that produced this result.
    pub attempt: u32,
}

impl ActionResult {
    pub fn new(
        slot: ActionSlot,
        outcome: ActionOutcome,
        executed_at: DateTime<Utc>,
        attempt: u32,
    ) -> Self {
        Self {
            rule_id: slot.rule_id,
            action: slot.action,
            outcome: outcome.kind,
            detail: outcome.detail,
            executed_at,
            attempt,
        }
    }

    pub fn slot(&self) -> ActionSlot {
        ActionSlot::new(self.rule_id, self.action.clone())
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: EventType,
    timestamp: DateTime<Utc>,
    payload: Payload,
    source_entity: String,
    source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,

    status: EventStatus,
    #[serde(default)]
    processed_at: Option<DateTime<Utc>>,
    /// Rules already counted against this event (times_triggered is bumped once per pair).
    #[serde(default)]
    matched_rules: Vec<RuleId>,
    #[serde(default)]
    actions_triggered: Vec<ActionSlot>,
    #[serde(default)]
    action_results: BTreeMap<ActionSlot, ActionResult>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    replay_count: u32,
    /// Attempts cut short by an expired lease or a restart.
    #[serde(default)]
    abandoned_count: u32,
    /// `retry_count` at the last operator replay; the retry budget counts from here.
    #[serde(default)]
    retry_floor: u32,
}

impl Event {
    /// A fresh pending event with an empty envelope.
    pub fn new(
        id: EventId,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        payload: Payload,
        source_entity: impl Into<String>,
        source_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id,
            event_type,
            timestamp,
            payload,
            source_entity: source_entity.into(),
            source_id: source_id.into(),
            user_id,
            status: EventStatus::Pending,
            processed_at: None,
            matched_rules: Vec::new(),
            actions_triggered: Vec::new(),
            action_results: BTreeMap::new(),
            error_message: None,
            retry_count: 0,
            replay_count: 0,
            abandoned_count: 0,
            retry_floor: 0,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    pub fn source_entity(&self) -> &str {
        &self.source_entity
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn matched_rules(&self) -> &[RuleId] {
        &self.matched_rules
    }

    pub fn actions_triggered(&self) -> &[ActionSlot] {
        &self.actions_triggered
    }

    pub fn action_results(&self) -> &BTreeMap<ActionSlot, ActionResult> {
        &self.action_results
    }

    /// First recorded result for `action`, in rule-id order.
    pub fn result_for(&self, action: &str) -> Option<&ActionResult> {
        self.action_results
            .values()
            .find(|r| r.action.as_str() == action)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn replay_count(&self) -> u32 {
        self.replay_count
    }

    pub fn abandoned_count(&self) -> u32 {
        self.abandoned_count
    }

    /// Retries consumed since creation or since the last operator replay.
    pub fn retries_in_budget(&self) -> u32 {
        self.retry_count.saturating_sub(self.retry_floor)
    }

    /// 1-based number of the attempt currently running (or about to run).
    ///
    /// Every way an attempt can end bumps one counter, so no two attempts share a number.
    pub fn attempt(&self) -> u32 {
        self.retry_count + self.replay_count + self.abandoned_count + 1
    }

    pub fn has_succeeded(&self, slot: &ActionSlot) -> bool {
        self.action_results
            .get(slot)
            .is_some_and(ActionResult::succeeded)
    }

    fn transition(&mut self, to: EventStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                event_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub(crate) fn mark_processing(&mut self) -> Result<(), EngineError> {
        self.transition(EventStatus::Processing)
    }

    pub(crate) fn mark_completed(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition(EventStatus::Completed)?;
        self.processed_at = Some(at);
        self.error_message = None;
        Ok(())
    }

    pub(crate) fn mark_failed(
        &mut self,
        at: DateTime<Utc>,
        reason: String,
    ) -> Result<(), EngineError> {
        self.transition(EventStatus::Failed)?;
        self.processed_at = Some(at);
        self.error_message = Some(reason);
        Ok(())
    }

    /// Back to pending for another automatic attempt. Consumes one retry.
    pub(crate) fn mark_retry(&mut self, reason: String) -> Result<(), EngineError> {
        self.transition(EventStatus::Pending)?;
        self.retry_count += 1;
        self.error_message = Some(reason);
        Ok(())
    }

    /// Back to pending because the lease holder vanished. Consumes no retry.
    pub(crate) fn release(&mut self, reason: String) -> Result<(), EngineError> {
        if self.status != EventStatus::Processing {
            return Err(EngineError::InvalidTransition {
                event_id: self.id,
                from: self.status,
                to: EventStatus::Pending,
            });
        }
        self.transition(EventStatus::Pending)?;
        self.abandoned_count += 1;
        self.error_message = Some(reason);
        Ok(())
    }

    /// Operator replay of a failed event. Gives it a fresh retry budget.
    pub(crate) fn mark_replayed(&mut self) -> Result<(), EngineError> {
        if self.status != EventStatus::Failed {
            return Err(EngineError::InvalidTransition {
                event_id: self.id,
                from: self.status,
                to: EventStatus::Pending,
            });
        }
        self.transition(EventStatus::Pending)?;
        self.replay_count += 1;
        self.retry_floor = self.retry_count;
        self.processed_at = None;
        self.error_message = None;
        Ok(())
    }

    /// Remembers `rules` as counted; returns the ones not seen before.
    pub(crate) fn note_matched(&mut self, rules: &[RuleId]) -> Vec<RuleId> {
        let fresh: Vec<RuleId> = rules
            .iter()
            .copied()
            .filter(|id| !self.matched_rules.contains(id))
            .collect();
        self.matched_rules.extend(fresh.iter().copied());
        fresh
    }

    /// Stores an action result.
    ///
    /// A slot that already succeeded is never overwritten; returns `false` in that case.
    pub(crate) fn record_result(&mut self, result: ActionResult) -> bool {
        let slot = result.slot();
        if self.has_succeeded(&slot) {
            return false;
        }
        if !self.actions_triggered.contains(&slot) {
            self.actions_triggered.push(slot.clone());
        }
        self.action_results.insert(slot, result);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event() -> Event {
        let mut payload = Payload::new();
        payload.insert("name".into(), serde_json::json!("Ada"));
        Event::new(
            EventId::from_ulid(Ulid::new()),
            EventType::CreatorRegistered,
            at(0),
            payload,
            "creator",
            "c-1",
            Some("u-1".into()),
        )
    }

    fn result(rule: u64, action: &str, outcome: ActionOutcome, attempt: u32) -> ActionResult {
        ActionResult::new(ActionSlot::new(RuleId::new(rule), action), outcome, at(1), attempt)
    }

    #[test]
    fn new_event_has_empty_pending_envelope() {
        let e = event();
        assert_eq!(e.status(), EventStatus::Pending);
        assert_eq!(e.retry_count(), 0);
        assert!(e.action_results().is_empty());
        assert!(e.actions_triggered().is_empty());
        assert_eq!(e.attempt(), 1);
        assert_eq!(e.payload_field("name"), Some(&serde_json::json!("Ada")));
    }

    #[test]
    fn succeeded_slot_is_never_overwritten() {
        let mut e = event();
        assert!(e.record_result(result(1, "log_event", ActionOutcome::success(), 1)));
        assert!(!e.record_result(result(1, "log_event", ActionOutcome::transient("x"), 2)));

        let stored = e.result_for("log_event").unwrap();
        assert!(stored.succeeded());
        assert_eq!(stored.attempt, 1);
        assert_eq!(e.actions_triggered().len(), 1);
    }

    #[test]
    fn failed_slot_is_updated_in_place() {
        let mut e = event();
        e.record_result(result(1, "update_arris_memory", ActionOutcome::transient("503"), 1));
        e.record_result(result(1, "update_arris_memory", ActionOutcome::success(), 2));

        let stored = e.result_for("update_arris_memory").unwrap();
        assert!(stored.succeeded());
        assert_eq!(stored.attempt, 2);
        assert_eq!(e.actions_triggered().len(), 1);
    }

    #[test]
    fn same_action_in_two_rules_gets_two_slots() {
        let mut e = event();
        e.record_result(result(1, "log_event", ActionOutcome::success(), 1));
        e.record_result(result(2, "log_event", ActionOutcome::success(), 1));
        assert_eq!(e.action_results().len(), 2);
        assert_eq!(e.result_for("log_event").unwrap().rule_id, RuleId::new(1));
    }

    #[test]
    fn retry_then_complete() {
        let mut e = event();
        e.mark_processing().unwrap();
        e.mark_retry("flaky".into()).unwrap();
        assert_eq!(e.status(), EventStatus::Pending);
        assert_eq!(e.retry_count(), 1);
        assert_eq!(e.error_message(), Some("flaky"));

        e.mark_processing().unwrap();
        e.mark_completed(at(5)).unwrap();
        assert_eq!(e.status(), EventStatus::Completed);
        assert_eq!(e.processed_at(), Some(at(5)));
        assert_eq!(e.error_message(), None);
        assert_eq!(e.retry_count(), 1);
    }

    #[test]
    fn completed_event_cannot_be_reclaimed() {
        let mut e = event();
        e.mark_processing().unwrap();
        e.mark_completed(at(1)).unwrap();
        let err = e.mark_processing().unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn replay_resets_budget_but_not_retry_count() {
        let mut e = event();
        for _ in 0..3 {
            e.mark_processing().unwrap();
            e.mark_retry("flaky".into()).unwrap();
        }
        e.mark_processing().unwrap();
        e.mark_failed(at(9), "gave up".into()).unwrap();

        e.mark_replayed().unwrap();
        assert_eq!(e.status(), EventStatus::Pending);
        assert_eq!(e.retry_count(), 3);
        assert_eq!(e.retries_in_budget(), 0);
        assert_eq!(e.replay_count(), 1);
        assert_eq!(e.error_message(), None);
        assert_eq!(e.attempt(), 5);
    }

    #[test]
    fn replay_requires_failed_status() {
        let mut e = event();
        assert!(e.mark_replayed().is_err());
    }

    #[test]
    fn release_requires_processing_and_keeps_retry_count() {
        let mut e = event();
        assert!(e.release("lease expired".into()).is_err());
        e.mark_processing().unwrap();
        e.release("lease expired".into()).unwrap();
        assert_eq!(e.status(), EventStatus::Pending);
        assert_eq!(e.retry_count(), 0);
        assert_eq!(e.retries_in_budget(), 0);
    }

    #[test]
    fn abandoned_attempt_does_not_share_its_number() {
        let mut e = event();
        e.mark_processing().unwrap();
        assert_eq!(e.attempt(), 1);
        e.release("lease expired".into()).unwrap();

        e.mark_processing().unwrap();
        assert_eq!(e.attempt(), 2);
        assert_eq!(e.abandoned_count(), 1);
        e.mark_retry("flaky".into()).unwrap();

        e.mark_processing().unwrap();
        assert_eq!(e.attempt(), 3);
    }

    #[test]
    fn note_matched_reports_only_new_rules() {
        let mut e = event();
        let first = e.note_matched(&[RuleId::new(1), RuleId::new(2)]);
        assert_eq!(first, vec![RuleId::new(1), RuleId::new(2)]);
        let second = e.note_matched(&[RuleId::new(2), RuleId::new(3)]);
        assert_eq!(second, vec![RuleId::new(3)]);
        assert_eq!(e.matched_rules().len(), 3);
    }

    #[test]
    fn event_survives_json_roundtrip() {
        let mut e = event();
        e.record_result(result(1, "log_event", ActionOutcome::success(), 1));
        let json = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}

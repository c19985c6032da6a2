//! Dispatcher: runs the actions of every matched rule for one claimed event.
//!
//! Rules run concurrently, one tokio task each. Inside a rule, actions run in list
//! order and the first failure stops the rest of that rule. Each outcome is written
//! to the store under the caller's lease as soon as it is known, and the lease is
//! renewed before every handler call so a long rule keeps ownership of its event.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::engine::after;
use crate::domain::{
    ActionFailure, ActionOutcome, ActionResult, ActionSlot, AttemptSummary, AutomationRule,
    EngineError, Event, OutcomeKind, RuleId,
};
use crate::handlers::HandlerRegistry;
use crate::ports::{Clock, EventStore};
use crate::store::Lease;

/// What one rule task reports back.
#[derive(Debug, Default)]
struct RuleReport {
    invoked: usize,
    skipped: usize,
    failure: Option<ActionFailure>,
}

#[derive(Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerRegistry>,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    action_timeout: Duration,
    lease_ttl: Duration,
}

impl Dispatcher {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        action_timeout: Duration,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            handlers,
            store,
            clock,
            action_timeout,
            lease_ttl,
        }
    }

    /// Dispatches every rule and waits for all of them.
    ///
    /// Store errors (including `LeaseLost`) abort the attempt; they are returned
    /// once every rule task has finished, never while an action is mid-flight.
    pub async fn dispatch(
        &self,
        event: Event,
        lease: &Lease,
        rules: Vec<AutomationRule>,
    ) -> Result<AttemptSummary, EngineError> {
        let event = Arc::new(event);
        let mut summary = AttemptSummary {
            rules_matched: rules.len(),
            ..AttemptSummary::default()
        };

        let mut tasks = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule_id = rule.id;
            let this = self.clone();
            let event = Arc::clone(&event);
            let lease = lease.clone();
            let handle = tokio::spawn(async move { this.run_rule(&event, &lease, rule).await });
            tasks.push((rule_id, handle));
        }

        let mut store_error = None;
        for (rule_id, handle) in tasks {
            match handle.await {
                Ok(Ok(report)) => {
                    summary.invoked += report.invoked;
                    summary.skipped += report.skipped;
                    summary.failures.extend(report.failure);
                }
                Ok(Err(err)) => {
                    store_error.get_or_insert(err);
                }
                Err(join_err) => {
                    warn!(event_id = %event.id(), rule_id = %rule_id, error = %join_err, "rule task died");
                    summary.failures.push(ActionFailure {
                        rule_id,
                        action: None,
                        kind: OutcomeKind::TransientFailure,
                        detail: Some(format!("rule task died: {join_err}")),
                    });
                }
            }
        }

        match store_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    async fn run_rule(
        &self,
        event: &Event,
        lease: &Lease,
        rule: AutomationRule,
    ) -> Result<RuleReport, EngineError> {
        let mut report = RuleReport::default();
        let attempt = event.attempt();

        for action in rule.actions {
            let slot = ActionSlot::new(rule.id, action);
            if event.has_succeeded(&slot) {
                debug!(event_id = %event.id(), slot = %slot, "action already succeeded; skipping");
                report.skipped += 1;
                continue;
            }

            let outcome = match self.handlers.get(&slot.action) {
                None => ActionOutcome::not_found(slot.action.as_str()),
                Some(handler) => {
                    let expires_at = after(self.clock.now(), self.lease_ttl);
                    self.store.renew_lease(lease, expires_at).await?;
                    report.invoked += 1;
                    match tokio::time::timeout(self.action_timeout, handler.execute(event)).await {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(err)) => err.into(),
                        Err(_) => ActionOutcome::timed_out(self.action_timeout),
                    }
                }
            };

            let failed = !outcome.kind.is_success();
            if failed {
                warn!(
                    event_id = %event.id(),
                    slot = %slot,
                    outcome = ?outcome.kind,
                    detail = outcome.detail.as_deref().unwrap_or(""),
                    "action failed"
                );
            } else {
                debug!(event_id = %event.id(), slot = %slot, "action succeeded");
            }

            let failure = failed.then(|| failure_of(rule.id, &slot, &outcome));
            let result = ActionResult::new(slot, outcome, self.clock.now(), attempt);
            self.store.record_action(lease, result).await?;

            if let Some(failure) = failure {
                report.failure = Some(failure);
                break;
            }
        }

        Ok(report)
    }
}

fn failure_of(rule_id: RuleId, slot: &ActionSlot, outcome: &ActionOutcome) -> ActionFailure {
    ActionFailure {
        rule_id,
        action: Some(slot.action.clone()),
        kind: outcome.kind,
        detail: outcome.detail.clone(),
    }
}

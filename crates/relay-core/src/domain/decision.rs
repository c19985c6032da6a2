//! Decision model: what happens to an event after one processing attempt.
//!
//! The dispatcher summarizes an attempt into an [`AttemptSummary`]; a [`Decider`]
//! turns that summary plus the event's retry history into a [`Decision`]. Deciders
//! are pure: applying the decision is the store's job.

use std::time::Duration;

use super::action::ActionId;
use super::errors::EngineError;
use super::event::Event;
use super::ids::RuleId;
use super::outcome::OutcomeKind;
use crate::store::RetryPolicy;

/// One action (or whole rule task) that did not succeed in this attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub rule_id: RuleId,
    /// `None` when the rule task itself died before reporting an action.
    pub action: Option<ActionId>,
    pub kind: OutcomeKind,
    pub detail: Option<String>,
}

impl ActionFailure {
    fn label(&self) -> String {
        match &self.action {
            Some(action) => action.to_string(),
            None => self.rule_id.to_string(),
        }
    }

    pub fn to_error(&self) -> EngineError {
        let detail = self.detail.clone().unwrap_or_default();
        match self.kind {
            OutcomeKind::HandlerNotFound => EngineError::HandlerNotFound(self.label()),
            OutcomeKind::PermanentFailure => EngineError::HandlerPermanent {
                action: self.label(),
                detail,
            },
            OutcomeKind::Success | OutcomeKind::TransientFailure | OutcomeKind::TimedOut => {
                EngineError::HandlerTransient {
                    action: self.label(),
                    detail,
                }
            }
        }
    }
}

/// Result of dispatching every matched rule once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptSummary {
    pub rules_matched: usize,
    /// Handler invocations made in this attempt.
    pub invoked: usize,
    /// Slots skipped because an earlier attempt already succeeded.
    pub skipped: usize,
    pub failures: Vec<ActionFailure>,
}

impl AttemptSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_terminal_failure(&self) -> bool {
        self.failures.iter().any(|f| f.kind.is_terminal())
    }

    fn describe(&self, pick: impl Fn(&ActionFailure) -> bool) -> String {
        self.failures
            .iter()
            .filter(|f| pick(f))
            .map(|f| f.to_error().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Complete,

    /// Return to pending and try again after `delay`.
    Retry { delay: Duration, reason: String },

    /// Terminal. Waits for an operator replay.
    Fail { reason: String },
}

pub trait Decider: Send + Sync {
    fn decide(&self, event: &Event, attempt: &AttemptSummary) -> Decision;
}

/// Terminal failures win over retryable ones. Retryable failures retry with
/// exponential backoff until the policy's retry budget is spent.
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, event: &Event, attempt: &AttemptSummary) -> Decision {
        if attempt.is_success() {
            return Decision::Complete;
        }

        if attempt.has_terminal_failure() {
            return Decision::Fail {
                reason: attempt.describe(|f| f.kind.is_terminal()),
            };
        }

        let last_error = attempt.describe(|_| true);
        let used = event.retries_in_budget();
        if used >= self.retry_policy.max_retries {
            return Decision::Fail {
                reason: EngineError::RetryBudgetExhausted {
                    retries: used,
                    last_error,
                }
                .to_string(),
            };
        }

        Decision::Retry {
            delay: self.retry_policy.next_delay(used + 1),
            reason: last_error,
        }
    }
}

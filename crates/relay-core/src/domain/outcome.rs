//! Outcome model: the result of running one action for one event.

use serde::{Deserialize, Serialize};

/// Classification of one action attempt.
///
/// Handlers only produce the first three kinds. `HandlerNotFound` and
/// `TimedOut` are produced by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    TransientFailure,
    PermanentFailure,
    HandlerNotFound,
    TimedOut,
}

impl OutcomeKind {
    pub fn is_success(self) -> bool {
        self == OutcomeKind::Success
    }

    /// Retrying the same action later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, OutcomeKind::TransientFailure | OutcomeKind::TimedOut)
    }

    /// Retrying is pointless; the event must fail.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OutcomeKind::PermanentFailure | OutcomeKind::HandlerNotFound
        )
    }
}

/// What a handler reports back for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActionOutcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            detail: None,
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::TransientFailure,
            detail: Some(detail.into()),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::PermanentFailure,
            detail: Some(detail.into()),
        }
    }

    pub(crate) fn not_found(action: &str) -> Self {
        Self {
            kind: OutcomeKind::HandlerNotFound,
            detail: Some(format!("no handler registered for action {action:?}")),
        }
    }

    pub(crate) fn timed_out(after: std::time::Duration) -> Self {
        Self {
            kind: OutcomeKind::TimedOut,
            detail: Some(format!("action timed out after {after:?}")),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

//! Errors - エラー型と分類

use thiserror::Error;

use super::ids::{EventId, RuleId};
use super::state::EventStatus;

/// ErrorKind はエラーの運用分類
///
/// - Transient: 一時的なエラー（リトライで成功しうる）
/// - Permanent: 恒久的なエラー（リトライ無意味、operator 対応が必要）
/// - Infrastructure: ストア自体の障害（呼び出し元へ返す）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed emit call (unknown event type, non-object payload, ...).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("handler not found for action={0}")]
    HandlerNotFound(String),

    #[error("transient failure in action={action}: {detail}")]
    HandlerTransient { action: String, detail: String },

    #[error("permanent failure in action={action}: {detail}")]
    HandlerPermanent { action: String, detail: String },

    #[error("retry budget exhausted after {retries} retries: {last_error}")]
    RetryBudgetExhausted { retries: u32, last_error: String },

    /// The event store could not be read or written. Never swallowed.
    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("event not found: {0}")]
    EventNotFound(EventId),

    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    /// Another worker won the claim race (or the event was not claimable).
    #[error("lease conflict on {event_id}: expected version {expected}, found {actual}")]
    LeaseConflict {
        event_id: EventId,
        expected: u64,
        actual: u64,
    },

    /// The lease expired or was replaced; the holder must stop writing.
    #[error("lease lost on {0}")]
    LeaseLost(EventId),

    #[error("invalid transition for {event_id}: {from} -> {to}")]
    InvalidTransition {
        event_id: EventId,
        from: EventStatus,
        to: EventStatus,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::HandlerTransient { .. }
            | EngineError::LeaseConflict { .. }
            | EngineError::LeaseLost(_) => ErrorKind::Transient,
            EngineError::StoreUnavailable(_) => ErrorKind::Infrastructure,
            EngineError::Validation(_)
            | EngineError::HandlerNotFound(_)
            | EngineError::HandlerPermanent { .. }
            | EngineError::RetryBudgetExhausted { .. }
            | EngineError::EventNotFound(_)
            | EngineError::RuleNotFound(_)
            | EngineError::InvalidTransition { .. } => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

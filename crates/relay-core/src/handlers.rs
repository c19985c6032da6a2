use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::app::builder::BuildError;
use crate::domain::{ActionId, ActionOutcome, Event};

/// Error a handler can return instead of an explicit failure outcome.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Worth retrying (timeouts, 5xx from a downstream service, ...).
    #[error("{0}")]
    Transient(String),

    /// Retrying will not help.
    #[error("{0}")]
    Permanent(String),
}

impl From<HandlerError> for ActionOutcome {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Transient(detail) => ActionOutcome::transient(detail),
            HandlerError::Permanent(detail) => ActionOutcome::permanent(detail),
        }
    }
}

/// A side effect plugged into the engine under a stable action name.
///
/// Handlers are invoked at least once per matched rule and must be idempotent:
/// a retry after a crash may run an action that already took effect.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, event: &Event) -> Result<ActionOutcome, HandlerError>;
}

/// Registry of handlers (action name -> handler).
///
/// Built during initialization (mutable), then shared read-only by every worker.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<ActionId, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        action: impl Into<ActionId>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), BuildError> {
        let action = action.into();
        if self.handlers.contains_key(&action) {
            return Err(BuildError::DuplicateHandler(action));
        }
        self.handlers.insert(action, handler);
        Ok(())
    }

    pub fn get(&self, action: &ActionId) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(action)
    }

    pub fn contains(&self, action: &ActionId) -> bool {
        self.handlers.contains_key(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionId> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutcomeKind;

    struct OkHandler;

    #[async_trait]
    impl ActionHandler for OkHandler {
        async fn execute(&self, _event: &Event) -> Result<ActionOutcome, HandlerError> {
            Ok(ActionOutcome::success())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register("log_event", Arc::new(OkHandler)).unwrap();

        let err = reg.register("log_event", Arc::new(OkHandler)).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateHandler(a) if a.as_str() == "log_event"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookup_by_action_name() {
        let mut reg = HandlerRegistry::new();
        reg.register("log_event", Arc::new(OkHandler)).unwrap();
        assert!(reg.contains(&ActionId::from("log_event")));
        assert!(reg.get(&ActionId::from("send_notification")).is_none());
    }

    #[test]
    fn handler_errors_become_outcomes() {
        let transient: ActionOutcome = HandlerError::Transient("503".into()).into();
        let permanent: ActionOutcome = HandlerError::Permanent("bad email".into()).into();
        assert_eq!(transient.kind, OutcomeKind::TransientFailure);
        assert_eq!(permanent.kind, OutcomeKind::PermanentFailure);
        assert_eq!(permanent.detail.as_deref(), Some("bad email"));
    }
}

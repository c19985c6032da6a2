//! Rule matcher: event type + payload -> ordered set of applicable rules.

use std::sync::{Arc, Mutex};

use tracing::debug;

use super::registry::{RuleRegistry, RuleSnapshot};
use crate::domain::{AutomationRule, EventType, Payload};

/// Active rules for `event_type` whose conditions hold, ascending by rule id.
pub fn match_rules(
    snapshot: &RuleSnapshot,
    event_type: EventType,
    payload: &Payload,
) -> Vec<AutomationRule> {
    snapshot
        .candidates(event_type)
        .iter()
        .filter(|rule| rule.applies_to(event_type, payload))
        .cloned()
        .collect()
}

/// Matches against a cached registry snapshot, refreshed when the registry's
/// generation moves.
pub struct RuleMatcher {
    registry: Arc<RuleRegistry>,
    cache: Mutex<Arc<RuleSnapshot>>,
}

impl RuleMatcher {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        let cache = Mutex::new(registry.snapshot());
        Self { registry, cache }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    fn current(&self) -> Arc<RuleSnapshot> {
        let mut cached = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let generation = self.registry.generation();
        if cached.generation != generation {
            debug!(from = cached.generation, to = generation, "refreshing rule snapshot");
            *cached = self.registry.snapshot();
        }
        Arc::clone(&cached)
    }

    pub fn matching(&self, event_type: EventType, payload: &Payload) -> Vec<AutomationRule> {
        match_rules(&self.current(), event_type, payload)
    }
}

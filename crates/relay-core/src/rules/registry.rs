//! Rule registry: the set of automation rules, indexed by event type.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::info;

use super::defaults;
use crate::domain::{ActionId, AutomationRule, EngineError, EventType, NewRule, RuleId};

#[derive(Default)]
struct RegistryState {
    rules: BTreeMap<RuleId, AutomationRule>,
    /// Rule ids per event type, ascending.
    by_type: HashMap<EventType, Vec<RuleId>>,
    next_id: u64,
}

/// Immutable view of the rules for matching. Rebuilt whenever the registry's
/// generation changes.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    pub generation: u64,
    by_type: HashMap<EventType, Vec<AutomationRule>>,
}

impl RuleSnapshot {
    /// Rules bound to `event_type`, ascending by id. Includes inactive rules.
    pub fn candidates(&self, event_type: EventType) -> &[AutomationRule] {
        self.by_type
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Holds every rule ever created. Rules are never deleted, only deactivated.
///
/// Admin edits bump `generation`; trigger counters do not, so the hot path never
/// invalidates matcher caches.
pub struct RuleRegistry {
    state: RwLock<RegistryState>,
    generation: AtomicU64,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// A registry holding the default seed rules.
    pub fn seeded() -> Result<Self, EngineError> {
        let registry = Self::new();
        for rule in defaults::default_rules() {
            registry.add_rule(rule)?;
        }
        Ok(registry)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn add_rule(&self, rule: NewRule) -> Result<AutomationRule, EngineError> {
        validate_actions(&rule.actions)?;
        if rule.name.trim().is_empty() {
            return Err(EngineError::Validation("rule name must not be empty".into()));
        }

        let created = {
            let mut state = self.write();
            state.next_id += 1;
            let id = RuleId::new(state.next_id);
            let created = rule.into_rule(id);
            state
                .by_type
                .entry(created.event_type)
                .or_default()
                .push(id);
            state.rules.insert(id, created.clone());
            created
        };
        self.bump();

        info!(
            rule_id = %created.id,
            name = %created.name,
            event_type = %created.event_type,
            "rule added"
        );
        Ok(created)
    }

    fn edit(
        &self,
        id: RuleId,
        f: impl FnOnce(&mut AutomationRule),
    ) -> Result<AutomationRule, EngineError> {
        let updated = {
            let mut state = self.write();
            let rule = state.rules.get_mut(&id).ok_or(EngineError::RuleNotFound(id))?;
            f(rule);
            rule.clone()
        };
        self.bump();
        Ok(updated)
    }

    pub fn activate(&self, id: RuleId) -> Result<AutomationRule, EngineError> {
        let rule = self.edit(id, |r| r.is_active = true)?;
        info!(rule_id = %id, "rule activated");
        Ok(rule)
    }

    pub fn deactivate(&self, id: RuleId) -> Result<AutomationRule, EngineError> {
        let rule = self.edit(id, |r| r.is_active = false)?;
        info!(rule_id = %id, "rule deactivated");
        Ok(rule)
    }

    /// Replaces the ordered action list of a rule.
    pub fn set_actions(
        &self,
        id: RuleId,
        actions: Vec<ActionId>,
    ) -> Result<AutomationRule, EngineError> {
        validate_actions(&actions)?;
        let rule = self.edit(id, |r| r.actions = actions)?;
        info!(rule_id = %id, actions = rule.actions.len(), "rule actions replaced");
        Ok(rule)
    }

    pub fn get(&self, id: RuleId) -> Option<AutomationRule> {
        self.read().rules.get(&id).cloned()
    }

    /// All rules, ascending by id.
    pub fn list(&self) -> Vec<AutomationRule> {
        self.read().rules.values().cloned().collect()
    }

    pub fn list_for(&self, event_type: EventType) -> Vec<AutomationRule> {
        let state = self.read();
        state
            .by_type
            .get(&event_type)
            .into_iter()
            .flatten()
            .filter_map(|id| state.rules.get(id).cloned())
            .collect()
    }

    /// Consistent copy of the rules together with the generation it reflects.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        let state = self.read();
        // read under the lock: every bump happens after a write guard is dropped
        let generation = self.generation();
        let by_type = state
            .by_type
            .iter()
            .map(|(event_type, ids)| {
                let rules: Vec<AutomationRule> = ids
                    .iter()
                    .filter_map(|id| state.rules.get(id).cloned())
                    .collect();
                (*event_type, rules)
            })
            .collect();
        Arc::new(RuleSnapshot {
            generation,
            by_type,
        })
    }

    /// Bumps `times_triggered` and `last_triggered` for each rule.
    pub fn record_trigger(&self, ids: &[RuleId], at: DateTime<Utc>) {
        let mut state = self.write();
        for id in ids {
            if let Some(rule) = state.rules.get_mut(id) {
                rule.times_triggered += 1;
                rule.last_triggered = Some(at);
            }
        }
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_actions(actions: &[ActionId]) -> Result<(), EngineError> {
    if actions.is_empty() {
        return Err(EngineError::Validation("rule must list at least one action".into()));
    }
    if let Some(blank) = actions.iter().find(|a| a.as_str().trim().is_empty()) {
        return Err(EngineError::Validation(format!("invalid action id {blank:?}")));
    }
    Ok(())
}

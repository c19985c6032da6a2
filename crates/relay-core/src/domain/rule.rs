//! Automation rules: event type + conditions -> ordered actions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionId;
use super::event::Payload;
use super::event_type::EventType;
use super::ids::RuleId;

/// Field -> expected value. All entries must hold (AND). Empty matches everything.
pub type Conditions = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub description: String,
    pub event_type: EventType,
    #[serde(default)]
    pub conditions: Conditions,
    pub actions: Vec<ActionId>,
    pub is_active: bool,
    #[serde(default)]
    pub times_triggered: u64,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

impl AutomationRule {
    /// Every condition key must be present in the payload with an equal value.
    pub fn conditions_hold(&self, payload: &Payload) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| payload.get(field) == Some(expected))
    }

    pub fn applies_to(&self, event_type: EventType, payload: &Payload) -> bool {
        self.is_active && self.event_type == event_type && self.conditions_hold(payload)
    }
}

/// Definition of a rule before the registry assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub event_type: EventType,
    #[serde(default)]
    pub conditions: Conditions,
    pub actions: Vec<ActionId>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewRule {
    pub fn new<A: Into<ActionId>>(
        name: impl Into<String>,
        event_type: EventType,
        actions: impl IntoIterator<Item = A>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            event_type,
            conditions: Conditions::new(),
            actions: actions.into_iter().map(Into::into).collect(),
            is_active: true,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn when(mut self, field: impl Into<String>, expected: serde_json::Value) -> Self {
        self.conditions.insert(field.into(), expected);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub(crate) fn into_rule(self, id: RuleId) -> AutomationRule {
        AutomationRule {
            id,
            name: self.name,
            description: self.description,
            event_type: self.event_type,
            conditions: self.conditions,
            actions: self.actions,
            is_active: self.is_active,
            times_triggered: 0,
            last_triggered: None,
        }
    }
}

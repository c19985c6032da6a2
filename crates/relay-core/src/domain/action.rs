use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::ids::RuleId;

/// Stable name of an action capability (e.g. `log_event`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One action position in one rule: the key of `action_results`.
///
/// Rendered as `rule-<id>/<action>` so it can be a JSON object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionSlot {
    pub rule_id: RuleId,
    pub action: ActionId,
}

impl ActionSlot {
    pub fn new(rule_id: RuleId, action: impl Into<ActionId>) -> Self {
        Self {
            rule_id,
            action: action.into(),
        }
    }
}

impl fmt::Display for ActionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rule_id, self.action)
    }
}

impl FromStr for ActionSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rule, action) = s
            .split_once('/')
            .ok_or_else(|| format!("malformed action slot: {s:?}"))?;
        let rule_id = rule
            .parse::<RuleId>()
            .map_err(|e| format!("malformed rule id in slot {s:?}: {e}"))?;
        if action.is_empty() {
            return Err(format!("empty action in slot {s:?}"));
        }
        Ok(Self::new(rule_id, action))
    }
}

impl Serialize for ActionSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActionSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

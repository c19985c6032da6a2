//! Domain identifiers (strongly-typed IDs).
//!
//! ## ULID
//! - event と lease は ULID を使用（生成順でソート可能、調整なしで生成可能）
//! - `Id<T>` の `T` は PhantomData のマーカー型で、`EventId` と `LeaseId` を
//!   コンパイル時に区別する
//!
//! ## RuleId
//! rule は registry が採番する単調増加の整数。照合順序を実行間で再現するため。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for the ULID-backed id types.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` (e.g. "evt-").
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    /// Accepts both the prefixed display form and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTag {}

impl IdMarker for EventTag {
    fn prefix() -> &'static str {
        "evt-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeaseTag {}

impl IdMarker for LeaseTag {
    fn prefix() -> &'static str {
        "lease-"
    }
}

/// Identifier of an emitted event.
pub type EventId = Id<EventTag>;

/// Token identifying one claim on an event. A new claim always gets a new token.
pub type LeaseId = Id<LeaseTag>;

/// Identifier of an automation rule. Assigned in ascending order by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u64);

impl RuleId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule-{}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("rule-").unwrap_or(s);
        raw.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        let event = EventId::from_ulid(Ulid::new());
        let lease = LeaseId::from_ulid(Ulid::new());

        assert!(event.to_string().starts_with("evt-"));
        assert!(lease.to_string().starts_with("lease-"));
        assert_eq!(RuleId::new(7).to_string(), "rule-7");
    }

    #[test]
    fn event_id_parses_display_form_and_bare_ulid() {
        let ulid = Ulid::new();
        let id = EventId::from_ulid(ulid);

        assert_eq!(id.to_string().parse::<EventId>().unwrap(), id);
        assert_eq!(ulid.to_string().parse::<EventId>().unwrap(), id);
        assert!("evt-not-a-ulid".parse::<EventId>().is_err());
    }

    #[test]
    fn event_id_serializes_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = EventId::from_ulid(ulid);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn rule_ids_order_numerically() {
        let mut ids = vec![RuleId::new(10), RuleId::new(2), RuleId::new(33)];
        ids.sort();
        assert_eq!(ids, vec![RuleId::new(2), RuleId::new(10), RuleId::new(33)]);
        assert_eq!("rule-10".parse::<RuleId>().unwrap(), RuleId::new(10));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<EventId>(), size_of::<Ulid>());
        assert_eq!(size_of::<LeaseId>(), 16);
    }
}

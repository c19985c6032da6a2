//! Operator query filter over stored events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Event, EventStatus, EventType};

/// All set fields must match. Date bounds are inclusive-exclusive: `[from, until)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub event_type: Option<EventType>,
    pub source_entity: Option<String>,
    pub source_id: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn with_status(status: EventStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.status.is_none_or(|s| s == event.status())
            && self.event_type.is_none_or(|t| t == event.event_type())
            && self
                .source_entity
                .as_deref()
                .is_none_or(|s| s == event.source_entity())
            && self
                .source_id
                .as_deref()
                .is_none_or(|s| s == event.source_id())
            && self
                .user_id
                .as_deref()
                .is_none_or(|u| Some(u) == event.user_id())
            && self.from.is_none_or(|from| event.timestamp() >= from)
            && self.until.is_none_or(|until| event.timestamp() < until)
    }
}

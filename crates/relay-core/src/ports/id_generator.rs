//! IdGenerator port.
//!
//! Ids are ULIDs whose timestamp part comes from the injected [`Clock`], so ids
//! generated under a `FixedClock` still sort by (fixed) time while staying unique.

use crate::domain::ids::{EventId, LeaseId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn event_id(&self) -> EventId;

    fn lease_id(&self) -> LeaseId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn event_id(&self) -> EventId {
        EventId::from(self.next())
    }

    fn lease_id(&self) -> LeaseId {
        LeaseId::from(self.next())
    }
}

//! Domain model (ids, events, rules, outcomes, decisions, errors).

pub mod action;
pub mod decision;
pub mod errors;
pub mod event;
pub mod event_type;
pub mod ids;
pub mod outcome;
pub mod rule;
pub mod state;

pub use action::{ActionId, ActionSlot};
pub use decision::{ActionFailure, AttemptSummary, Decider, Decision, DefaultDecider};
pub use errors::{EngineError, ErrorKind};
pub use event::{ActionResult, Event, Payload};
pub use event_type::EventType;
pub use ids::{EventId, LeaseId, RuleId};
pub use outcome::{ActionOutcome, OutcomeKind};
pub use rule::{AutomationRule, Conditions, NewRule};
pub use state::EventStatus;

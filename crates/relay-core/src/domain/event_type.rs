//! The closed set of business events the bus accepts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::EngineError;

/// Event types, serialized in SCREAMING_SNAKE_CASE (`CREATOR_REGISTERED`, ...).
///
/// Emitting domains own the payload schema of each type; the engine only uses
/// the type for rule lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    CreatorRegistered,
    CreatorOnboarded,
    SubscriptionStarted,
    SubscriptionUpgraded,
    SubscriptionCancelled,
    ProposalSubmitted,
    ProposalApproved,
    ProposalRejected,
    ProjectCreated,
    ProjectCompleted,
    RevenueRecorded,
    MilestoneReached,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::CreatorRegistered,
        EventType::CreatorOnboarded,
        EventType::SubscriptionStarted,
        EventType::SubscriptionUpgraded,
        EventType::SubscriptionCancelled,
        EventType::ProposalSubmitted,
        EventType::ProposalApproved,
        EventType::ProposalRejected,
        EventType::ProjectCreated,
        EventType::ProjectCompleted,
        EventType::RevenueRecorded,
        EventType::MilestoneReached,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::CreatorRegistered => "CREATOR_REGISTERED",
            EventType::CreatorOnboarded => "CREATOR_ONBOARDED",
            EventType::SubscriptionStarted => "SUBSCRIPTION_STARTED",
            EventType::SubscriptionUpgraded => "SUBSCRIPTION_UPGRADED",
            EventType::SubscriptionCancelled => "SUBSCRIPTION_CANCELLED",
            EventType::ProposalSubmitted => "PROPOSAL_SUBMITTED",
            EventType::ProposalApproved => "PROPOSAL_APPROVED",
            EventType::ProposalRejected => "PROPOSAL_REJECTED",
            EventType::ProjectCreated => "PROJECT_CREATED",
            EventType::ProjectCompleted => "PROJECT_COMPLETED",
            EventType::RevenueRecorded => "REVENUE_RECORDED",
            EventType::MilestoneReached => "MILESTONE_REACHED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    /// Case-insensitive, so `creator_registered` is accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EngineError::Validation(format!("unknown event_type: {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CREATOR_REGISTERED", EventType::CreatorRegistered)]
    #[case("proposal_approved", EventType::ProposalApproved)]
    #[case(" REVENUE_RECORDED ", EventType::RevenueRecorded)]
    fn parses_known_names(#[case] raw: &str, #[case] expected: EventType) {
        assert_eq!(raw.parse::<EventType>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("CREATOR_DELETED")]
    #[case("creator registered")]
    fn rejects_unknown_names_with_validation_error(#[case] raw: &str) {
        let err = raw.parse::<EventType>().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn display_matches_serde_name() {
        for t in EventType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }
}

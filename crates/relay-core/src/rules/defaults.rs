//! Action names and the rules every fresh deployment starts with.

use serde_json::json;

use crate::domain::{EventType, NewRule};

pub const LOG_EVENT: &str = "log_event";
pub const UPDATE_ARRIS_MEMORY: &str = "update_arris_memory";
pub const CREATE_WELCOME_TASK: &str = "create_welcome_task";
pub const QUEUE_FOR_REVIEW: &str = "queue_for_review";
pub const CREATE_ONBOARDING_PROJECT: &str = "create_onboarding_project";
pub const SEND_NOTIFICATION: &str = "send_notification";

/// Every action the seed rules reference.
pub const SEED_ACTIONS: [&str; 6] = [
    LOG_EVENT,
    UPDATE_ARRIS_MEMORY,
    CREATE_WELCOME_TASK,
    QUEUE_FOR_REVIEW,
    CREATE_ONBOARDING_PROJECT,
    SEND_NOTIFICATION,
];

pub fn default_rules() -> Vec<NewRule> {
    vec![
        NewRule::new(
            "Welcome new creator",
            EventType::CreatorRegistered,
            [LOG_EVENT, UPDATE_ARRIS_MEMORY, CREATE_WELCOME_TASK],
        )
        .describe("Record the registration and open a welcome task"),
        NewRule::new(
            "Review submitted proposal",
            EventType::ProposalSubmitted,
            [LOG_EVENT, QUEUE_FOR_REVIEW],
        )
        .describe("Queue every new proposal for review"),
        NewRule::new(
            "Kick off approved proposal",
            EventType::ProposalApproved,
            [LOG_EVENT, CREATE_ONBOARDING_PROJECT, SEND_NOTIFICATION],
        )
        .describe("Create the onboarding project and notify the creator"),
        NewRule::new(
            "Remember revenue",
            EventType::RevenueRecorded,
            [LOG_EVENT, UPDATE_ARRIS_MEMORY],
        )
        .describe("Feed recorded revenue into behavioral memory"),
        NewRule::new(
            "Celebrate upgrade",
            EventType::SubscriptionUpgraded,
            [LOG_EVENT, SEND_NOTIFICATION],
        )
        .describe("Thank creators who move to a paid tier")
        .when("new_tier", json!("pro")),
    ]
}

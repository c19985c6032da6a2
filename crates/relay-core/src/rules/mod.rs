//! Rules: registry of automation rules, the matcher, and the seed set.

pub mod defaults;
mod matcher;
mod registry;

pub use matcher::{match_rules, RuleMatcher};
pub use registry::{RuleRegistry, RuleSnapshot};

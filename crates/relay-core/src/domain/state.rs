//! State - event の処理状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of an event.
///
/// # 状態遷移
/// - Pending -> Processing -> Completed
/// - Processing -> Pending（リトライ可能な失敗で予算が残っている、または lease 期限切れ）
/// - Processing -> Failed（恒久的な失敗、または予算切れ）
/// - Failed -> Pending（operator の replay のみ）
///
/// Processing は lease 保持中にのみ存在する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventStatus {
    /// No automatic transition leaves this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }

    pub fn is_claimable(self) -> bool {
        matches!(self, EventStatus::Pending)
    }

    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::EventStatus::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Pending, Processing, true)]
    #[case(Processing, Completed, true)]
    #[case(Processing, Pending, true)]
    #[case(Processing, Failed, true)]
    #[case(Failed, Pending, true)]
    #[case(Pending, Completed, false)]
    #[case(Pending, Failed, false)]
    #[case(Completed, Pending, false)]
    #[case(Completed, Processing, false)]
    #[case(Failed, Processing, false)]
    #[case(Processing, Processing, false)]
    fn transition_table(#[case] from: EventStatus, #[case] to: EventStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_pending_is_claimable() {
        assert!(Pending.is_claimable());
        assert!(!Processing.is_claimable());
        assert!(!Completed.is_claimable());
        assert!(!Failed.is_claimable());
    }
}

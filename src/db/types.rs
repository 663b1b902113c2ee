use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Lifecycle stage of an examinee/paper association, stored as SMALLINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub(crate) enum Stage {
    NotStarted = 0,
    InProgress = 1,
    Submitted = 2,
    Expired = 3,
}

impl Stage {
    pub(crate) const ALL: [Stage; 4] =
        [Stage::NotStarted, Stage::InProgress, Stage::Submitted, Stage::Expired];

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Stage::Submitted | Stage::Expired)
    }

    /// Forward-only transitions; nothing leaves a terminal stage.
    pub(crate) fn can_transition_to(self, next: Stage) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (Stage::NotStarted, Stage::InProgress) => true,
            (Stage::InProgress, Stage::Submitted) => true,
            (Stage::NotStarted | Stage::InProgress, Stage::Expired) => true,
            _ => false,
        }
    }

    /// Stages from which `self` may be entered.
    pub(crate) fn sources(self) -> Vec<Stage> {
        Stage::ALL.into_iter().filter(|from| from.can_transition_to(self)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EventKind {
    Heartbeat,
    LongInactive,
    Submit,
}

impl EventKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            EventKind::Heartbeat => "heartbeat",
            EventKind::LongInactive => "long_inactive",
            EventKind::Submit => "submit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub(crate) enum LoginPlatform {
    Exam = 1,
}

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Idle,
    PromptBuilt,
    AgentRunning,
    AgentSucceeded,
    Sanitized,
    AgentFailed,
    FallbackRunning,
    FallbackSucceeded,
    FallbackFailed,
    Displayed,
    WarningDisplayed,
    ErrorDisplayed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Displayed | Self::WarningDisplayed | Self::ErrorDisplayed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEvent {
    QuestionAccepted,
    QuestionMissing,
    AgentStarted,
    AgentCompleted,
    AgentRaised,
    AnswerSanitized,
    AnswerRendered,
    FallbackStarted,
    FallbackSkipped,
    FallbackCompleted,
    FallbackRaised,
    RowsRendered,
    ErrorRendered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestState,
    pub to: RequestState,
    pub event: RequestEvent,
}

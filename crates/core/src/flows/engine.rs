use thiserror::Error;

use crate::flows::states::{RequestEvent, RequestState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RequestState, event: RequestEvent },
}

/// Lifecycle of a single question. Nothing here outlives the request.
#[derive(Clone, Debug)]
pub struct RequestFlow {
    state: RequestState,
    trail: Vec<TransitionOutcome>,
}

impl Default for RequestFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestFlow {
    pub fn new() -> Self {
        Self { state: RequestState::Idle, trail: Vec::new() }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn trail(&self) -> &[TransitionOutcome] {
        &self.trail
    }

    /// Visited states, starting with `Idle`.
    pub fn path(&self) -> Vec<RequestState> {
        std::iter::once(RequestState::Idle).chain(self.trail.iter().map(|step| step.to)).collect()
    }

    pub fn apply(&mut self, event: RequestEvent) -> Result<RequestState, FlowTransitionError> {
        let to = transition(self.state, event)?;
        self.trail.push(TransitionOutcome { from: self.state, to, event });
        self.state = to;
        Ok(to)
    }
}

pub fn transition(
    current: RequestState,
    event: RequestEvent,
) -> Result<RequestState, FlowTransitionError> {
    use RequestEvent::{
        AgentCompleted, AgentRaised, AgentStarted, AnswerRendered, AnswerSanitized, ErrorRendered,
        FallbackCompleted, FallbackRaised, FallbackSkipped, FallbackStarted, QuestionAccepted,
        QuestionMissing, RowsRendered,
    };
    use RequestState::{
        AgentFailed, AgentRunning, AgentSucceeded, Displayed, ErrorDisplayed, FallbackFailed,
        FallbackRunning, FallbackSucceeded, Idle, PromptBuilt, Sanitized, WarningDisplayed,
    };

    let to = match (current, event) {
        (Idle, QuestionAccepted) => PromptBuilt,
        (Idle, QuestionMissing) => WarningDisplayed,
        (PromptBuilt, AgentStarted) => AgentRunning,
        (AgentRunning, AgentCompleted) => AgentSucceeded,
        (AgentRunning, AgentRaised) => AgentFailed,
        (AgentSucceeded, AnswerSanitized) => Sanitized,
        (Sanitized, AnswerRendered) => Displayed,
        (AgentFailed, FallbackStarted) => FallbackRunning,
        (AgentFailed, FallbackSkipped) => ErrorDisplayed,
        (FallbackRunning, FallbackCompleted) => FallbackSucceeded,
        (FallbackRunning, FallbackRaised) => FallbackFailed,
        (FallbackSucceeded, RowsRendered) => Displayed,
        (FallbackFailed, ErrorRendered) => ErrorDisplayed,
        (state, event) => return Err(FlowTransitionError::InvalidTransition { state, event }),
    };

    Ok(to)
}

pub mod engine;
pub mod states;

pub use engine::{transition, FlowTransitionError, RequestFlow};
pub use states::{RequestEvent, RequestState, TransitionOutcome};

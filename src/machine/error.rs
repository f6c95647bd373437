use thiserror::Error;

use crate::machine::types::{AuthEventKind, AuthState};

/// Errors returned by [`crate::AuthStateMachine::handle`].
///
/// None of these change the public state. Failed account-service calls are not
/// errors: they resolve to a cancelled [`crate::TransitionReport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthMachineError {
    /// `state` is the unchanged state the event was rejected in
    #[error("Invalid transition: {event} is not accepted in state {state}")]
    InvalidTransition {
        state: AuthState,
        event: AuthEventKind,
    },
    #[error("Protocol defect in {machine}: step {step} has no transition for {event}")]
    ProtocolDefect {
        machine: &'static str,
        step: &'static str,
        event: &'static str,
    },
    #[error("Internal machine {machine} exceeded {limit} steps")]
    StepLimitExceeded { machine: &'static str, limit: usize },
}

/// Errors building an event from an OAuth redirect URL
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("Invalid redirect URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Redirect URL is missing the `{0}` query parameter")]
    MissingParameter(&'static str),
}

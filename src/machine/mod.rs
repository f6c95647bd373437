// Auth Machine Module - two-layer authentication state machine
//
// The public machine is what host applications see: a handful of states and
// events where one event can end in different states. Each accepted
// (state, event) pair is realized by a small deterministic internal machine
// that steps through account-service calls.

pub mod error;
pub mod executor;
pub mod internal;
pub mod state_machine;
pub mod table;
pub mod types;


pub use error::{AuthMachineError, RedirectError};
pub use executor::StepExecutor;
pub use internal::{InternalMachine, InternalState, InternalTransition, StepEvent};
pub use state_machine::AuthStateMachine;
pub use table::{TransitionEntry, TransitionTable};
pub use types::{
    AuthEvent, AuthEventKind, AuthState, AuthStateKind, CancelReason, Resolution, StateChange,
    StateTransitionRecord, StepFailure, TransitionReport,
};

// Internal state machines - one deterministic machine per public transition
//
// Each internal state names the account-service call that is about to run.
// The call's result comes back as a StepEvent and `step` decides what happens
// next: run another call, complete with a new public state, or cancel.

use std::fmt;
use tracing::warn;

use crate::account::{AccountError, AccountStatus, CallErrorKind};
use crate::machine::error::AuthMachineError;
use crate::machine::types::AuthState;

/// Result of one account-service call, fed back into the internal machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    GetAuthStateSuccess { status: AccountStatus },
    BeginOAuthFlowSuccess { oauth_url: String },
    BeginPairingFlowSuccess { oauth_url: String },
    CompleteOAuthFlowSuccess,
    InitializeDeviceSuccess,
    EnsureCapabilitiesSuccess,
    CheckAuthorizationStatusSuccess { active: bool },
    DisconnectSuccess,
    CallError { error: AccountError },
}

impl StepEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StepEvent::GetAuthStateSuccess { .. } => "GetAuthStateSuccess",
            StepEvent::BeginOAuthFlowSuccess { .. } => "BeginOAuthFlowSuccess",
            StepEvent::BeginPairingFlowSuccess { .. } => "BeginPairingFlowSuccess",
            StepEvent::CompleteOAuthFlowSuccess => "CompleteOAuthFlowSuccess",
            StepEvent::InitializeDeviceSuccess => "InitializeDeviceSuccess",
            StepEvent::EnsureCapabilitiesSuccess => "EnsureCapabilitiesSuccess",
            StepEvent::CheckAuthorizationStatusSuccess { .. } => "CheckAuthorizationStatusSuccess",
            StepEvent::DisconnectSuccess => "DisconnectSuccess",
            StepEvent::CallError { .. } => "CallError",
        }
    }

    pub fn error(&self) -> Option<&AccountError> {
        match self {
            StepEvent::CallError { error } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do after an internal step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalTransition<T = InternalState> {
    /// Run the account-service call for this internal state next
    Process(T),
    /// Finish by moving the public machine to this state
    Complete(AuthState),
    /// Finish and leave the public state as it was
    Cancel,
}

impl<T> InternalTransition<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> InternalTransition<U> {
        match self {
            InternalTransition::Process(state) => InternalTransition::Process(f(state)),
            InternalTransition::Complete(public) => InternalTransition::Complete(public),
            InternalTransition::Cancel => InternalTransition::Cancel,
        }
    }
}

/// A deterministic internal machine definition.
///
/// `step` is a pure function of (current step, event). Any pair without a
/// defined transition is a protocol defect, never a silent fallback.
pub trait InternalMachine: Sized {
    /// Name of the machine for logs and defect reports
    const NAME: &'static str;

    /// Name of the current step
    fn name(&self) -> &'static str;

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError>;
}

fn no_transition<M: InternalMachine>(
    step: &M,
    event: &StepEvent,
) -> Result<InternalTransition<M>, AuthMachineError> {
    Err(AuthMachineError::ProtocolDefect {
        machine: M::NAME,
        step: step.name(),
        event: event.name(),
    })
}

use InternalTransition::{Cancel, Complete, Process};

/// Uninitialized + GetAuthState
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeStep {
    GetAuthState,
    EnsureCapabilities,
}

impl InternalMachine for InitializeStep {
    const NAME: &'static str = "Initialize";

    fn name(&self) -> &'static str {
        match self {
            InitializeStep::GetAuthState => "GetAuthState",
            InitializeStep::EnsureCapabilities => "EnsureCapabilities",
        }
    }

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError> {
        match (self, event) {
            (Self::GetAuthState, StepEvent::GetAuthStateSuccess { status }) => Ok(match status {
                AccountStatus::NotAuthenticated => Complete(AuthState::NotAuthenticated),
                AccountStatus::AuthIssues => Complete(AuthState::AuthIssues),
                AccountStatus::Authenticated => Process(Self::EnsureCapabilities),
            }),
            (Self::GetAuthState, StepEvent::CallError { .. }) => Ok(Cancel),
            (Self::EnsureCapabilities, StepEvent::EnsureCapabilitiesSuccess) => {
                Ok(Complete(AuthState::Authenticated))
            }
            // A restored account that cannot update its device record needs attention
            (Self::EnsureCapabilities, StepEvent::CallError { .. }) => {
                Ok(Complete(AuthState::AuthIssues))
            }
            (step, event) => no_transition(&step, &event),
        }
    }
}

/// NotAuthenticated/AuthIssues + BeginOAuthFlow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOAuthStep {
    BeginOAuthFlow {
        scopes: Vec<String>,
        entrypoint: String,
    },
}

impl InternalMachine for BeginOAuthStep {
    const NAME: &'static str = "BeginOAuth";

    fn name(&self) -> &'static str {
        "BeginOAuthFlow"
    }

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError> {
        match (self, event) {
            (Self::BeginOAuthFlow { .. }, StepEvent::BeginOAuthFlowSuccess { oauth_url }) => {
                Ok(Complete(AuthState::Authenticating { oauth_url }))
            }
            (Self::BeginOAuthFlow { .. }, StepEvent::CallError { .. }) => Ok(Cancel),
            (step, event) => no_transition(&step, &event),
        }
    }
}

/// NotAuthenticated + BeginPairingFlow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginPairingStep {
    BeginPairingFlow {
        pairing_url: String,
        scopes: Vec<String>,
        entrypoint: String,
    },
}

impl InternalMachine for BeginPairingStep {
    const NAME: &'static str = "BeginPairing";

    fn name(&self) -> &'static str {
        "BeginPairingFlow"
    }

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError> {
        match (self, event) {
            (Self::BeginPairingFlow { .. }, StepEvent::BeginPairingFlowSuccess { oauth_url }) => {
                Ok(Complete(AuthState::Authenticating { oauth_url }))
            }
            (Self::BeginPairingFlow { .. }, StepEvent::CallError { .. }) => Ok(Cancel),
            (step, event) => no_transition(&step, &event),
        }
    }
}

/// Authenticating + CompleteOAuthFlow. All-or-nothing: any failure cancels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOAuthStep {
    CompleteOAuthFlow { code: String, state: String },
    InitializeDevice,
}

impl InternalMachine for CompleteOAuthStep {
    const NAME: &'static str = "CompleteOAuth";

    fn name(&self) -> &'static str {
        match self {
            CompleteOAuthStep::CompleteOAuthFlow { .. } => "CompleteOAuthFlow",
            CompleteOAuthStep::InitializeDevice => "InitializeDevice",
        }
    }

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError> {
        match (self, event) {
            (Self::CompleteOAuthFlow { .. }, StepEvent::CompleteOAuthFlowSuccess) => {
                Ok(Process(Self::InitializeDevice))
            }
            (Self::CompleteOAuthFlow { .. }, StepEvent::CallError { .. }) => Ok(Cancel),
            (Self::InitializeDevice, StepEvent::InitializeDeviceSuccess) => {
                Ok(Complete(AuthState::Authenticated))
            }
            (Self::InitializeDevice, StepEvent::CallError { .. }) => Ok(Cancel),
            (step, event) => no_transition(&step, &event),
        }
    }
}

/// Authenticated + CheckAuthorizationStatus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckAuthorizationStep {
    CheckAuthorizationStatus,
}

impl InternalMachine for CheckAuthorizationStep {
    const NAME: &'static str = "CheckAuthorization";

    fn name(&self) -> &'static str {
        "CheckAuthorizationStatus"
    }

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError> {
        match (self, event) {
            (Self::CheckAuthorizationStatus, StepEvent::CheckAuthorizationStatusSuccess { active }) => {
                if active {
                    Ok(Complete(AuthState::Authenticated))
                } else {
                    Ok(Complete(AuthState::AuthIssues))
                }
            }
            (Self::CheckAuthorizationStatus, StepEvent::CallError { error }) => {
                match error.kind() {
                    CallErrorKind::Authentication => Ok(Complete(AuthState::AuthIssues)),
                    CallErrorKind::Other => Ok(Cancel),
                }
            }
            (step, event) => no_transition(&step, &event),
        }
    }
}

/// Authenticated/AuthIssues + Disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectStep {
    Disconnect,
}

impl InternalMachine for DisconnectStep {
    const NAME: &'static str = "Disconnect";

    fn name(&self) -> &'static str {
        "Disconnect"
    }

    fn step(self, event: StepEvent) -> Result<InternalTransition<Self>, AuthMachineError> {
        match (self, event) {
            (Self::Disconnect, StepEvent::DisconnectSuccess) => {
                Ok(Complete(AuthState::NotAuthenticated))
            }
            // Local sign-out always goes ahead, even if the server could not be told
            (Self::Disconnect, StepEvent::CallError { error }) => {
                warn!(error = %error, "Disconnect call failed, signing out locally");
                Ok(Complete(AuthState::NotAuthenticated))
            }
            (step, event) => no_transition(&step, &event),
        }
    }
}

/// The internal state of whichever machine is currently running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalState {
    Initialize(InitializeStep),
    BeginOAuth(BeginOAuthStep),
    BeginPairing(BeginPairingStep),
    CompleteOAuth(CompleteOAuthStep),
    CheckAuthorization(CheckAuthorizationStep),
    Disconnect(DisconnectStep),
}

impl InternalState {
    pub fn machine(&self) -> &'static str {
        match self {
            InternalState::Initialize(_) => InitializeStep::NAME,
            InternalState::BeginOAuth(_) => BeginOAuthStep::NAME,
            InternalState::BeginPairing(_) => BeginPairingStep::NAME,
            InternalState::CompleteOAuth(_) => CompleteOAuthStep::NAME,
            InternalState::CheckAuthorization(_) => CheckAuthorizationStep::NAME,
            InternalState::Disconnect(_) => DisconnectStep::NAME,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InternalState::Initialize(step) => step.name(),
            InternalState::BeginOAuth(step) => step.name(),
            InternalState::BeginPairing(step) => step.name(),
            InternalState::CompleteOAuth(step) => step.name(),
            InternalState::CheckAuthorization(step) => step.name(),
            InternalState::Disconnect(step) => step.name(),
        }
    }

    pub fn step(self, event: StepEvent) -> Result<InternalTransition, AuthMachineError> {
        Ok(match self {
            InternalState::Initialize(step) => step.step(event)?.map(InternalState::Initialize),
            InternalState::BeginOAuth(step) => step.step(event)?.map(InternalState::BeginOAuth),
            InternalState::BeginPairing(step) => {
                step.step(event)?.map(InternalState::BeginPairing)
            }
            InternalState::CompleteOAuth(step) => {
                step.step(event)?.map(InternalState::CompleteOAuth)
            }
            InternalState::CheckAuthorization(step) => {
                step.step(event)?.map(InternalState::CheckAuthorization)
            }
            InternalState::Disconnect(step) => step.step(event)?.map(InternalState::Disconnect),
        })
    }
}

impl fmt::Display for InternalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.machine(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_error() -> StepEvent {
        StepEvent::CallError {
            error: AccountError::Authentication("token expired".to_string()),
        }
    }

    fn other_error() -> StepEvent {
        StepEvent::CallError {
            error: AccountError::network("connection reset"),
        }
    }

    /// Every event the executor can produce for a given internal state
    fn possible_events(state: &InternalState) -> Vec<StepEvent> {
        let mut events = vec![auth_error(), other_error()];
        match state {
            InternalState::Initialize(InitializeStep::GetAuthState) => {
                for status in [
                    AccountStatus::NotAuthenticated,
                    AccountStatus::AuthIssues,
                    AccountStatus::Authenticated,
                ] {
                    events.push(StepEvent::GetAuthStateSuccess { status });
                }
            }
            InternalState::Initialize(InitializeStep::EnsureCapabilities) => {
                events.push(StepEvent::EnsureCapabilitiesSuccess)
            }
            InternalState::BeginOAuth(_) => events.push(StepEvent::BeginOAuthFlowSuccess {
                oauth_url: "https://example.com/oauth".to_string(),
            }),
            InternalState::BeginPairing(_) => events.push(StepEvent::BeginPairingFlowSuccess {
                oauth_url: "https://example.com/pair".to_string(),
            }),
            InternalState::CompleteOAuth(CompleteOAuthStep::CompleteOAuthFlow { .. }) => {
                events.push(StepEvent::CompleteOAuthFlowSuccess)
            }
            InternalState::CompleteOAuth(CompleteOAuthStep::InitializeDevice) => {
                events.push(StepEvent::InitializeDeviceSuccess)
            }
            InternalState::CheckAuthorization(_) => {
                events.push(StepEvent::CheckAuthorizationStatusSuccess { active: true });
                events.push(StepEvent::CheckAuthorizationStatusSuccess { active: false });
            }
            InternalState::Disconnect(_) => events.push(StepEvent::DisconnectSuccess),
        }
        events
    }

    fn initial_states() -> Vec<InternalState> {
        vec![
            InternalState::Initialize(InitializeStep::GetAuthState),
            InternalState::BeginOAuth(BeginOAuthStep::BeginOAuthFlow {
                scopes: vec!["profile".to_string()],
                entrypoint: "menu".to_string(),
            }),
            InternalState::BeginPairing(BeginPairingStep::BeginPairingFlow {
                pairing_url: "https://example.com/pair#channel".to_string(),
                scopes: vec!["profile".to_string()],
                entrypoint: "pairing".to_string(),
            }),
            InternalState::CompleteOAuth(CompleteOAuthStep::CompleteOAuthFlow {
                code: "code".to_string(),
                state: "state".to_string(),
            }),
            InternalState::CheckAuthorization(CheckAuthorizationStep::CheckAuthorizationStatus),
            InternalState::Disconnect(DisconnectStep::Disconnect),
        ]
    }

    /// Walk every path from `state`, returning the longest path length
    fn explore(state: InternalState, depth: usize) -> usize {
        assert!(depth < 10, "internal machine {state} does not terminate");
        let mut longest = depth + 1;
        for event in possible_events(&state) {
            let label = format!("{state} + {event}");
            match state.clone().step(event) {
                Ok(InternalTransition::Process(next)) => {
                    longest = longest.max(explore(next, depth + 1));
                }
                Ok(InternalTransition::Complete(_)) | Ok(InternalTransition::Cancel) => {}
                Err(err) => panic!("{label} has no transition: {err}"),
            }
        }
        longest
    }

    #[test]
    fn test_every_reachable_step_handles_every_possible_event() {
        for state in initial_states() {
            let longest = explore(state.clone(), 0);
            assert!(longest <= 2, "{state} runs {longest} steps");
        }
    }

    #[test]
    fn test_initialize_reports_not_authenticated() {
        let transition = InitializeStep::GetAuthState
            .step(StepEvent::GetAuthStateSuccess {
                status: AccountStatus::NotAuthenticated,
            })
            .unwrap();
        assert_eq!(transition, Complete(AuthState::NotAuthenticated));
    }

    #[test]
    fn test_initialize_authenticated_requires_capabilities() {
        let transition = InitializeStep::GetAuthState
            .step(StepEvent::GetAuthStateSuccess {
                status: AccountStatus::Authenticated,
            })
            .unwrap();
        assert_eq!(transition, Process(InitializeStep::EnsureCapabilities));

        assert_eq!(
            InitializeStep::EnsureCapabilities
                .step(StepEvent::EnsureCapabilitiesSuccess)
                .unwrap(),
            Complete(AuthState::Authenticated)
        );
        // Either error kind lands in AuthIssues
        assert_eq!(
            InitializeStep::EnsureCapabilities.step(auth_error()).unwrap(),
            Complete(AuthState::AuthIssues)
        );
        assert_eq!(
            InitializeStep::EnsureCapabilities.step(other_error()).unwrap(),
            Complete(AuthState::AuthIssues)
        );
    }

    #[test]
    fn test_initialize_get_auth_state_failure_cancels() {
        assert_eq!(InitializeStep::GetAuthState.step(other_error()).unwrap(), Cancel);
    }

    #[test]
    fn test_begin_oauth_flow() {
        let step = BeginOAuthStep::BeginOAuthFlow {
            scopes: vec!["profile".to_string()],
            entrypoint: "menu".to_string(),
        };
        assert_eq!(step.clone().step(auth_error()).unwrap(), Cancel);
        assert_eq!(
            step.step(StepEvent::BeginOAuthFlowSuccess {
                oauth_url: "https://example.com/oauth-start".to_string(),
            })
            .unwrap(),
            Complete(AuthState::Authenticating {
                oauth_url: "https://example.com/oauth-start".to_string(),
            })
        );
    }

    #[test]
    fn test_complete_oauth_pipeline_is_all_or_nothing() {
        let step = CompleteOAuthStep::CompleteOAuthFlow {
            code: "test-code".to_string(),
            state: "test-state".to_string(),
        };
        assert_eq!(step.clone().step(other_error()).unwrap(), Cancel);
        assert_eq!(
            step.step(StepEvent::CompleteOAuthFlowSuccess).unwrap(),
            Process(CompleteOAuthStep::InitializeDevice)
        );

        // Token exchange succeeded but device registration failed: still cancelled
        assert_eq!(CompleteOAuthStep::InitializeDevice.step(other_error()).unwrap(), Cancel);
        assert_eq!(
            CompleteOAuthStep::InitializeDevice
                .step(StepEvent::InitializeDeviceSuccess)
                .unwrap(),
            Complete(AuthState::Authenticated)
        );
    }

    #[test]
    fn test_check_authorization_outcomes() {
        let step = CheckAuthorizationStep::CheckAuthorizationStatus;
        assert_eq!(
            step.clone()
                .step(StepEvent::CheckAuthorizationStatusSuccess { active: true })
                .unwrap(),
            Complete(AuthState::Authenticated)
        );
        assert_eq!(
            step.clone()
                .step(StepEvent::CheckAuthorizationStatusSuccess { active: false })
                .unwrap(),
            Complete(AuthState::AuthIssues)
        );
        assert_eq!(
            step.clone().step(auth_error()).unwrap(),
            Complete(AuthState::AuthIssues)
        );
        assert_eq!(step.step(other_error()).unwrap(), Cancel);
    }

    #[test]
    fn test_disconnect_always_signs_out() {
        assert_eq!(
            DisconnectStep::Disconnect.step(StepEvent::DisconnectSuccess).unwrap(),
            Complete(AuthState::NotAuthenticated)
        );
        assert_eq!(
            DisconnectStep::Disconnect.step(other_error()).unwrap(),
            Complete(AuthState::NotAuthenticated)
        );
    }

    #[test]
    fn test_mismatched_event_is_protocol_defect() {
        let err = InternalState::CompleteOAuth(CompleteOAuthStep::InitializeDevice)
            .step(StepEvent::DisconnectSuccess)
            .unwrap_err();
        assert_eq!(
            err,
            AuthMachineError::ProtocolDefect {
                machine: "CompleteOAuth",
                step: "InitializeDevice",
                event: "DisconnectSuccess",
            }
        );
    }

    #[test]
    fn test_step_is_deterministic() {
        for state in initial_states() {
            for event in possible_events(&state) {
                let first = state.clone().step(event.clone());
                let second = state.clone().step(event);
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn test_internal_state_display() {
        let state = InternalState::CompleteOAuth(CompleteOAuthStep::CompleteOAuthFlow {
            code: "secret".to_string(),
            state: "secret".to_string(),
        });
        assert_eq!(state.to_string(), "CompleteOAuth(CompleteOAuthFlow)");
    }
}

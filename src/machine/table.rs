// Transition table - the legal (public state, public event) pairs as data
//
// Each entry names the internal machine that realizes the transition and a
// factory that seeds its first internal state from the event payload.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::machine::error::AuthMachineError;
use crate::machine::internal::{
    BeginOAuthStep, BeginPairingStep, CheckAuthorizationStep, CompleteOAuthStep, DisconnectStep,
    InitializeStep, InternalState, InternalTransition,
};
use crate::machine::types::{AuthEvent, AuthEventKind, AuthState, AuthStateKind};

/// Builds the first internal transition for an event.
///
/// Zero-step transitions return `Complete` directly.
pub type MachineFactory = fn(&AuthEvent) -> Result<InternalTransition, AuthMachineError>;

#[derive(Debug, Clone, Copy)]
pub struct TransitionEntry {
    pub machine: &'static str,
    pub factory: MachineFactory,
}

impl TransitionEntry {
    pub fn start(&self, event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
        (self.factory)(event)
    }
}

static STANDARD: LazyLock<TransitionTable> = LazyLock::new(TransitionTable::build_standard);

#[derive(Debug, Clone)]
pub struct TransitionTable {
    entries: HashMap<(AuthStateKind, AuthEventKind), TransitionEntry>,
}

impl TransitionTable {
    /// The table every [`crate::AuthStateMachine`] uses, built once on first access
    pub fn standard() -> &'static TransitionTable {
        &STANDARD
    }

    fn build_standard() -> Self {
        use AuthEventKind as E;
        use AuthStateKind as S;

        let mut table = Self {
            entries: HashMap::new(),
        };

        table.insert(S::Uninitialized, E::GetAuthState, "Initialize", start_initialize);

        table.insert(S::NotAuthenticated, E::BeginOAuthFlow, "BeginOAuth", start_begin_oauth);
        table.insert(S::NotAuthenticated, E::BeginPairingFlow, "BeginPairing", start_begin_pairing);

        table.insert(S::Authenticating, E::CompleteOAuthFlow, "CompleteOAuth", start_complete_oauth);
        table.insert(S::Authenticating, E::CancelOAuthFlow, "CancelOAuth", start_cancel_oauth);

        table.insert(
            S::Authenticated,
            E::CheckAuthorizationStatus,
            "CheckAuthorization",
            start_check_authorization,
        );
        table.insert(S::Authenticated, E::Disconnect, "Disconnect", start_disconnect);

        // Pairing connects new devices and is not a way to re-authenticate
        table.insert(S::AuthIssues, E::BeginOAuthFlow, "BeginOAuth", start_begin_oauth);
        table.insert(S::AuthIssues, E::Disconnect, "Disconnect", start_disconnect);

        table
    }

    fn insert(
        &mut self,
        state: AuthStateKind,
        event: AuthEventKind,
        machine: &'static str,
        factory: MachineFactory,
    ) {
        self.entries
            .insert((state, event), TransitionEntry { machine, factory });
    }

    pub fn lookup(&self, state: &AuthState, event: &AuthEvent) -> Option<&TransitionEntry> {
        self.entries.get(&(state.kind(), event.kind()))
    }

    pub fn contains(&self, state: AuthStateKind, event: AuthEventKind) -> bool {
        self.entries.contains_key(&(state, event))
    }

    /// Events accepted in `state`, in declaration order
    pub fn events_for(&self, state: AuthStateKind) -> Vec<AuthEventKind> {
        AuthEventKind::ALL
            .into_iter()
            .filter(|event| self.contains(state, *event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(AuthStateKind, AuthEventKind), &TransitionEntry)> {
        self.entries.iter()
    }
}

fn seed_mismatch(machine: &'static str, event: &AuthEvent) -> AuthMachineError {
    AuthMachineError::ProtocolDefect {
        machine,
        step: "start",
        event: event.kind().name(),
    }
}

fn start_initialize(_event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    Ok(InternalTransition::Process(InternalState::Initialize(
        InitializeStep::GetAuthState,
    )))
}

fn start_begin_oauth(event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    match event {
        AuthEvent::BeginOAuthFlow { scopes, entrypoint } => Ok(InternalTransition::Process(
            InternalState::BeginOAuth(BeginOAuthStep::BeginOAuthFlow {
                scopes: scopes.clone(),
                entrypoint: entrypoint.clone(),
            }),
        )),
        other => Err(seed_mismatch("BeginOAuth", other)),
    }
}

fn start_begin_pairing(event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    match event {
        AuthEvent::BeginPairingFlow {
            pairing_url,
            scopes,
            entrypoint,
        } => Ok(InternalTransition::Process(InternalState::BeginPairing(
            BeginPairingStep::BeginPairingFlow {
                pairing_url: pairing_url.clone(),
                scopes: scopes.clone(),
                entrypoint: entrypoint.clone(),
            },
        ))),
        other => Err(seed_mismatch("BeginPairing", other)),
    }
}

fn start_complete_oauth(event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    match event {
        AuthEvent::CompleteOAuthFlow { code, state } => Ok(InternalTransition::Process(
            InternalState::CompleteOAuth(CompleteOAuthStep::CompleteOAuthFlow {
                code: code.clone(),
                state: state.clone(),
            }),
        )),
        other => Err(seed_mismatch("CompleteOAuth", other)),
    }
}

fn start_cancel_oauth(_event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    Ok(InternalTransition::Complete(AuthState::NotAuthenticated))
}

fn start_check_authorization(_event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    Ok(InternalTransition::Process(InternalState::CheckAuthorization(
        CheckAuthorizationStep::CheckAuthorizationStatus,
    )))
}

fn start_disconnect(_event: &AuthEvent) -> Result<InternalTransition, AuthMachineError> {
    Ok(InternalTransition::Process(InternalState::Disconnect(
        DisconnectStep::Disconnect,
    )))
}

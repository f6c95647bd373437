// Core types for the public authentication state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::account::AccountError;
use crate::machine::error::RedirectError;

/// Authentication states observed by the host application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    /// Waiting for [`AuthEvent::GetAuthState`], which must be the first event sent
    Uninitialized,
    /// No account connected, or the user signed out
    NotAuthenticated,
    /// An OAuth flow is in progress; send the user to `oauth_url`
    Authenticating { oauth_url: String },
    /// Account connected and this device registered
    Authenticated,
    /// Account was connected but its tokens stopped working.
    /// The user has to authenticate again before the account is usable.
    AuthIssues,
}

/// Payload-free discriminant of [`AuthState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthStateKind {
    Uninitialized,
    NotAuthenticated,
    Authenticating,
    Authenticated,
    AuthIssues,
}

impl AuthStateKind {
    pub const ALL: [AuthStateKind; 5] = [
        AuthStateKind::Uninitialized,
        AuthStateKind::NotAuthenticated,
        AuthStateKind::Authenticating,
        AuthStateKind::Authenticated,
        AuthStateKind::AuthIssues,
    ];
}

impl AuthState {
    pub fn kind(&self) -> AuthStateKind {
        match self {
            AuthState::Uninitialized => AuthStateKind::Uninitialized,
            AuthState::NotAuthenticated => AuthStateKind::NotAuthenticated,
            AuthState::Authenticating { .. } => AuthStateKind::Authenticating,
            AuthState::Authenticated => AuthStateKind::Authenticated,
            AuthState::AuthIssues => AuthStateKind::AuthIssues,
        }
    }

    /// Returns true only when the account is connected and usable
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Returns true while the user is part-way through a sign-in flow
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthState::Uninitialized | AuthState::Authenticating { .. })
    }

    pub fn oauth_url(&self) -> Option<&str> {
        match self {
            AuthState::Authenticating { oauth_url } => Some(oauth_url),
            _ => None,
        }
    }
}

/// Events the host sends to [`crate::AuthStateMachine::handle`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// Load the stored account and work out where we are. Only valid from `Uninitialized`.
    GetAuthState,
    /// Start an OAuth flow.
    ///
    /// On success the machine moves to [`AuthState::Authenticating`]; navigate the user to
    /// its `oauth_url` so they can sign in and authorize this client.
    BeginOAuthFlow {
        scopes: Vec<String>,
        entrypoint: String,
    },
    /// Start an OAuth flow from a pairing URL shown on an already connected device
    BeginPairingFlow {
        pairing_url: String,
        scopes: Vec<String>,
        entrypoint: String,
    },
    /// Finish the OAuth flow with the `code` and `state` from the redirect URI.
    ///
    /// See [`AuthEvent::from_oauth_redirect`].
    CompleteOAuthFlow { code: String, state: String },
    /// Abandon the in-progress OAuth flow and return to `NotAuthenticated`
    CancelOAuthFlow,
    /// Re-check the tokens of a connected account after the host saw an auth failure
    CheckAuthorizationStatus,
    /// Sign the user out
    Disconnect,
}

/// Payload-free discriminant of [`AuthEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthEventKind {
    GetAuthState,
    BeginOAuthFlow,
    BeginPairingFlow,
    CompleteOAuthFlow,
    CancelOAuthFlow,
    CheckAuthorizationStatus,
    Disconnect,
}

impl AuthEventKind {
    pub const ALL: [AuthEventKind; 7] = [
        AuthEventKind::GetAuthState,
        AuthEventKind::BeginOAuthFlow,
        AuthEventKind::BeginPairingFlow,
        AuthEventKind::CompleteOAuthFlow,
        AuthEventKind::CancelOAuthFlow,
        AuthEventKind::CheckAuthorizationStatus,
        AuthEventKind::Disconnect,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AuthEventKind::GetAuthState => "GetAuthState",
            AuthEventKind::BeginOAuthFlow => "BeginOAuthFlow",
            AuthEventKind::BeginPairingFlow => "BeginPairingFlow",
            AuthEventKind::CompleteOAuthFlow => "CompleteOAuthFlow",
            AuthEventKind::CancelOAuthFlow => "CancelOAuthFlow",
            AuthEventKind::CheckAuthorizationStatus => "CheckAuthorizationStatus",
            AuthEventKind::Disconnect => "Disconnect",
        }
    }
}

impl AuthEvent {
    pub fn kind(&self) -> AuthEventKind {
        match self {
            AuthEvent::GetAuthState => AuthEventKind::GetAuthState,
            AuthEvent::BeginOAuthFlow { .. } => AuthEventKind::BeginOAuthFlow,
            AuthEvent::BeginPairingFlow { .. } => AuthEventKind::BeginPairingFlow,
            AuthEvent::CompleteOAuthFlow { .. } => AuthEventKind::CompleteOAuthFlow,
            AuthEvent::CancelOAuthFlow => AuthEventKind::CancelOAuthFlow,
            AuthEvent::CheckAuthorizationStatus => AuthEventKind::CheckAuthorizationStatus,
            AuthEvent::Disconnect => AuthEventKind::Disconnect,
        }
    }

    pub fn begin_oauth(scopes: &[&str], entrypoint: &str) -> Self {
        AuthEvent::BeginOAuthFlow {
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            entrypoint: entrypoint.to_string(),
        }
    }

    /// Build a `CompleteOAuthFlow` event from the URL the OAuth flow redirected to
    pub fn from_oauth_redirect(redirect: &str) -> Result<Self, RedirectError> {
        let url = Url::parse(redirect)?;
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        match (code, state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => {
                Ok(AuthEvent::CompleteOAuthFlow { code, state })
            }
            (Some(code), _) if !code.is_empty() => Err(RedirectError::MissingParameter("state")),
            _ => Err(RedirectError::MissingParameter("code")),
        }
    }
}

// Display prints the variant name only; payloads never reach logs

impl fmt::Display for AuthStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthStateKind::Uninitialized => "Uninitialized",
            AuthStateKind::NotAuthenticated => "NotAuthenticated",
            AuthStateKind::Authenticating => "Authenticating",
            AuthStateKind::Authenticated => "Authenticated",
            AuthStateKind::AuthIssues => "AuthIssues",
        };
        f.write_str(name)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

impl fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// A failed account-service call that ended an internal machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: &'static str,
    pub error: AccountError,
}

/// Why an internal machine ended in Cancel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// An account-service call failed and no recovery transition applied
    StepFailed(StepFailure),
    /// The caller cancelled the in-flight transition
    Requested,
    /// The internal machine gave up without a failing call
    Aborted,
}

/// How a handled event was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The internal machine completed; the public state is now `TransitionReport::state`
    Completed,
    /// The internal machine cancelled; the public state is unchanged
    Cancelled(CancelReason),
}

/// Result of one successfully processed `handle` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    pub previous: AuthState,
    pub state: AuthState,
    pub resolution: Resolution,
    /// Number of account-service calls made
    pub steps: usize,
    pub correlation_id: String,
}

impl TransitionReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.resolution, Resolution::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.resolution, Resolution::Cancelled(_))
    }

    pub fn changed(&self) -> bool {
        self.previous != self.state
    }

    /// The call failure behind a cancelled transition, for diagnostics
    pub fn failure(&self) -> Option<&StepFailure> {
        match &self.resolution {
            Resolution::Cancelled(CancelReason::StepFailed(failure)) => Some(failure),
            _ => None,
        }
    }
}

/// Notification sent to subscribers whenever the public state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub previous: AuthState,
    pub current: AuthState,
    pub event: AuthEventKind,
    pub at: DateTime<Utc>,
}

/// Audit record of an applied state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransitionRecord {
    pub from_state: AuthStateKind,
    pub to_state: AuthStateKind,
    pub event: AuthEventKind,
    pub steps: usize,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

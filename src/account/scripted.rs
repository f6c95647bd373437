// Scripted account service - deterministic fake with no side effects
//
// Every call is answered from a per-method script and recorded in a call log.
// A call can also be held at a gate so concurrent and cancelled transitions
// can be observed while a step is still in flight.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use super::error::AccountError;
use super::traits::AccountService;
use super::types::{AccountStatus, AuthorizationStatus, DeviceCapability, DeviceType};

pub const DEFAULT_OAUTH_URL: &str = "https://accounts.example.com/authorization?state=scripted";

/// One recorded call against the scripted service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountCall {
    GetAuthState,
    BeginOAuthFlow {
        scopes: Vec<String>,
        entrypoint: String,
    },
    BeginPairingFlow {
        pairing_url: String,
        scopes: Vec<String>,
        entrypoint: String,
    },
    CompleteOAuthFlow {
        code: String,
        state: String,
    },
    InitializeDevice {
        name: String,
        device_type: DeviceType,
        capabilities: Vec<DeviceCapability>,
    },
    EnsureCapabilities {
        capabilities: Vec<DeviceCapability>,
    },
    CheckAuthorizationStatus,
    Disconnect,
}

impl AccountCall {
    /// Method name of the call, also the key used by [`ScriptedAccountService::hold`]
    pub fn name(&self) -> &'static str {
        match self {
            AccountCall::GetAuthState => "get_auth_state",
            AccountCall::BeginOAuthFlow { .. } => "begin_oauth_flow",
            AccountCall::BeginPairingFlow { .. } => "begin_pairing_flow",
            AccountCall::CompleteOAuthFlow { .. } => "complete_oauth_flow",
            AccountCall::InitializeDevice { .. } => "initialize_device",
            AccountCall::EnsureCapabilities { .. } => "ensure_capabilities",
            AccountCall::CheckAuthorizationStatus => "check_authorization_status",
            AccountCall::Disconnect => "disconnect",
        }
    }
}

/// Holds one call until released
#[derive(Debug, Default)]
pub struct CallGate {
    entered: Notify,
    release: Notify,
}

impl CallGate {
    /// Wait until the held call has been entered
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call return its scripted result
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug)]
struct Script {
    auth_state: Result<AccountStatus, AccountError>,
    oauth_url: Result<String, AccountError>,
    pairing_oauth_url: Result<String, AccountError>,
    complete_oauth: Result<(), AccountError>,
    initialize_device: Result<(), AccountError>,
    ensure_capabilities: Result<(), AccountError>,
    authorization: Result<AuthorizationStatus, AccountError>,
    disconnect: Result<(), AccountError>,
    calls: Vec<AccountCall>,
    gates: HashMap<String, Arc<CallGate>>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            auth_state: Ok(AccountStatus::NotAuthenticated),
            oauth_url: Ok(DEFAULT_OAUTH_URL.to_string()),
            pairing_oauth_url: Ok(DEFAULT_OAUTH_URL.to_string()),
            complete_oauth: Ok(()),
            initialize_device: Ok(()),
            ensure_capabilities: Ok(()),
            authorization: Ok(AuthorizationStatus { active: true }),
            disconnect: Ok(()),
            calls: Vec::new(),
            gates: HashMap::new(),
        }
    }
}

/// Account service whose answers are set up front. Every call succeeds by default.
#[derive(Debug, Default)]
pub struct ScriptedAccountService {
    script: Mutex<Script>,
}

impl ScriptedAccountService {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_auth_state(&self, result: Result<AccountStatus, AccountError>) {
        self.script().auth_state = result;
    }

    pub fn set_oauth_url(&self, result: Result<String, AccountError>) {
        self.script().oauth_url = result;
    }

    pub fn set_pairing_oauth_url(&self, result: Result<String, AccountError>) {
        self.script().pairing_oauth_url = result;
    }

    pub fn set_complete_oauth(&self, result: Result<(), AccountError>) {
        self.script().complete_oauth = result;
    }

    pub fn set_initialize_device(&self, result: Result<(), AccountError>) {
        self.script().initialize_device = result;
    }

    pub fn set_ensure_capabilities(&self, result: Result<(), AccountError>) {
        self.script().ensure_capabilities = result;
    }

    pub fn set_authorization(&self, result: Result<AuthorizationStatus, AccountError>) {
        self.script().authorization = result;
    }

    pub fn set_disconnect(&self, result: Result<(), AccountError>) {
        self.script().disconnect = result;
    }

    /// Hold the next call to `method` until the returned gate is released
    pub fn hold(&self, method: &str) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        self.script().gates.insert(method.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<AccountCall> {
        self.script().calls.clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.script().calls.iter().map(AccountCall::name).collect()
    }

    pub fn clear_calls(&self) {
        self.script().calls.clear();
    }

    async fn enter(&self, call: AccountCall) {
        let gate = {
            let mut script = self.script();
            let gate = script.gates.remove(call.name());
            script.calls.push(call);
            gate
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl AccountService for ScriptedAccountService {
    async fn get_auth_state(&self) -> Result<AccountStatus, AccountError> {
        self.enter(AccountCall::GetAuthState).await;
        self.script().auth_state.clone()
    }

    async fn begin_oauth_flow(
        &self,
        scopes: &[String],
        entrypoint: &str,
    ) -> Result<String, AccountError> {
        self.enter(AccountCall::BeginOAuthFlow {
            scopes: scopes.to_vec(),
            entrypoint: entrypoint.to_string(),
        })
        .await;
        self.script().oauth_url.clone()
    }

    async fn begin_pairing_flow(
        &self,
        pairing_url: &str,
        scopes: &[String],
        entrypoint: &str,
    ) -> Result<String, AccountError> {
        self.enter(AccountCall::BeginPairingFlow {
            pairing_url: pairing_url.to_string(),
            scopes: scopes.to_vec(),
            entrypoint: entrypoint.to_string(),
        })
        .await;
        self.script().pairing_oauth_url.clone()
    }

    async fn complete_oauth_flow(&self, code: &str, state: &str) -> Result<(), AccountError> {
        self.enter(AccountCall::CompleteOAuthFlow {
            code: code.to_string(),
            state: state.to_string(),
        })
        .await;
        self.script().complete_oauth.clone()
    }

    async fn initialize_device(
        &self,
        name: &str,
        device_type: DeviceType,
        capabilities: &[DeviceCapability],
    ) -> Result<(), AccountError> {
        self.enter(AccountCall::InitializeDevice {
            name: name.to_string(),
            device_type,
            capabilities: capabilities.to_vec(),
        })
        .await;
        self.script().initialize_device.clone()
    }

    async fn ensure_capabilities(
        &self,
        capabilities: &[DeviceCapability],
    ) -> Result<(), AccountError> {
        self.enter(AccountCall::EnsureCapabilities {
            capabilities: capabilities.to_vec(),
        })
        .await;
        self.script().ensure_capabilities.clone()
    }

    async fn check_authorization_status(&self) -> Result<AuthorizationStatus, AccountError> {
        self.enter(AccountCall::CheckAuthorizationStatus).await;
        self.script().authorization.clone()
    }

    async fn disconnect(&self) -> Result<(), AccountError> {
        self.enter(AccountCall::Disconnect).await;
        self.script().disconnect.clone()
    }
}

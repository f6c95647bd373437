// Step executor - runs the one account-service call an internal state names

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::account::{AccountError, AccountService, DeviceConfig};
use crate::machine::internal::{
    BeginOAuthStep, BeginPairingStep, CheckAuthorizationStep, CompleteOAuthStep, DisconnectStep,
    InitializeStep, InternalState, StepEvent,
};

/// Turns internal states into account-service calls and their results into step events.
///
/// Each `execute` makes exactly one call and never retries.
#[derive(Clone)]
pub struct StepExecutor {
    service: Arc<dyn AccountService>,
    device: DeviceConfig,
    step_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(service: Arc<dyn AccountService>, device: DeviceConfig) -> Self {
        Self {
            service,
            device,
            step_timeout: None,
        }
    }

    /// Fail any call that has not settled within `step_timeout`
    pub fn with_step_timeout(mut self, step_timeout: Option<Duration>) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    async fn call<T, F>(&self, call: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, AccountError>>,
    {
        match self.step_timeout {
            Some(limit) => timeout(limit, call).await.unwrap_or(Err(AccountError::Timeout {
                elapsed_ms: limit.as_millis() as u64,
            })),
            None => call.await,
        }
    }

    pub async fn execute(&self, state: &InternalState) -> StepEvent {
        debug!(machine = state.machine(), step = state.name(), "Executing step");

        let service = &self.service;
        let result = match state {
            InternalState::Initialize(InitializeStep::GetAuthState) => self
                .call(service.get_auth_state())
                .await
                .map(|status| StepEvent::GetAuthStateSuccess { status }),
            InternalState::Initialize(InitializeStep::EnsureCapabilities) => self
                .call(service.ensure_capabilities(&self.device.capabilities))
                .await
                .map(|()| StepEvent::EnsureCapabilitiesSuccess),
            InternalState::BeginOAuth(BeginOAuthStep::BeginOAuthFlow { scopes, entrypoint }) => {
                self.call(service.begin_oauth_flow(scopes, entrypoint))
                    .await
                    .map(|oauth_url| StepEvent::BeginOAuthFlowSuccess { oauth_url })
            }
            InternalState::BeginPairing(BeginPairingStep::BeginPairingFlow {
                pairing_url,
                scopes,
                entrypoint,
            }) => self
                .call(service.begin_pairing_flow(pairing_url, scopes, entrypoint))
                .await
                .map(|oauth_url| StepEvent::BeginPairingFlowSuccess { oauth_url }),
            InternalState::CompleteOAuth(CompleteOAuthStep::CompleteOAuthFlow { code, state }) => {
                self.call(service.complete_oauth_flow(code, state))
                    .await
                    .map(|()| StepEvent::CompleteOAuthFlowSuccess)
            }
            InternalState::CompleteOAuth(CompleteOAuthStep::InitializeDevice) => self
                .call(service.initialize_device(
                    &self.device.name,
                    self.device.device_type,
                    &self.device.capabilities,
                ))
                .await
                .map(|()| StepEvent::InitializeDeviceSuccess),
            InternalState::CheckAuthorization(CheckAuthorizationStep::CheckAuthorizationStatus) => {
                self.call(service.check_authorization_status())
                    .await
                    .map(|status| StepEvent::CheckAuthorizationStatusSuccess {
                        active: status.active,
                    })
            }
            InternalState::Disconnect(DisconnectStep::Disconnect) => self
                .call(service.disconnect())
                .await
                .map(|()| StepEvent::DisconnectSuccess),
        };

        let event = result.unwrap_or_else(|error| StepEvent::CallError { error });
        debug!(
            machine = state.machine(),
            step = state.name(),
            result = event.name(),
            "Step finished"
        );
        event
    }
}

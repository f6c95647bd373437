// Trait for dependency injection - the account service the machine drives

use async_trait::async_trait;

use super::error::AccountError;
use super::types::{AccountStatus, AuthorizationStatus, DeviceCapability, DeviceType};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Account service operations
///
/// Each method is one network (or storage) call. Implementations own retries
/// and backoff; the state machine invokes every method at most once per step
/// and only looks at success vs. failure and the returned payload.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Report the sign-in status of the locally stored account
    async fn get_auth_state(&self) -> Result<AccountStatus, AccountError>;

    /// Start an OAuth flow, returning the URL the user should be sent to
    async fn begin_oauth_flow(
        &self,
        scopes: &[String],
        entrypoint: &str,
    ) -> Result<String, AccountError>;

    /// Start an OAuth flow from a pairing URL scanned on another device
    async fn begin_pairing_flow(
        &self,
        pairing_url: &str,
        scopes: &[String],
        entrypoint: &str,
    ) -> Result<String, AccountError>;

    /// Exchange the redirect's code/state for tokens
    async fn complete_oauth_flow(&self, code: &str, state: &str) -> Result<(), AccountError>;

    /// Register this device with the account
    async fn initialize_device(
        &self,
        name: &str,
        device_type: DeviceType,
        capabilities: &[DeviceCapability],
    ) -> Result<(), AccountError>;

    /// Make sure the server-side device record advertises these capabilities
    async fn ensure_capabilities(
        &self,
        capabilities: &[DeviceCapability],
    ) -> Result<(), AccountError>;

    /// Ask the server whether the current refresh token is still active
    async fn check_authorization_status(&self) -> Result<AuthorizationStatus, AccountError>;

    /// Drop the local account state and revoke what can be revoked
    async fn disconnect(&self) -> Result<(), AccountError>;
}

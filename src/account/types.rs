// Value types exchanged with the account service

use serde::{Deserialize, Serialize};

/// Sign-in status the account service reports for the locally stored account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// No account is stored, or it was signed out
    NotAuthenticated,
    /// An account is stored but its tokens were rejected at some point
    AuthIssues,
    /// An account is stored and believed usable
    Authenticated,
}

/// Result of asking the account service whether the current tokens are still live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationStatus {
    pub active: bool,
}

/// Kind of device being registered with the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
    Tablet,
    Tv,
    Vr,
    Unknown,
}

/// Optional capabilities a device advertises to other devices on the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCapability {
    SendTab,
    CloseTabs,
}

/// Device identity used when initializing the device and re-checking capabilities.
///
/// When an already-connected account is restored only `capabilities` is sent;
/// name and type are kept from the server-side record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub device_type: DeviceType,
    pub capabilities: Vec<DeviceCapability>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "auth-lifecycle device".to_string(),
            device_type: DeviceType::Desktop,
            capabilities: vec![DeviceCapability::SendTab],
        }
    }
}

impl DeviceConfig {
    pub fn new(name: &str, device_type: DeviceType, capabilities: Vec<DeviceCapability>) -> Self {
        Self {
            name: name.to_string(),
            device_type,
            capabilities,
        }
    }
}

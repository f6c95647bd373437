// Account Service Module - the collaborator boundary
//
// Everything the state machine knows about the account service lives here:
// the async call surface, its failure type and the device identity passed
// to device registration.

pub mod error;
pub mod scripted;
pub mod traits;
pub mod types;

pub use error::{AccountError, CallErrorKind};
pub use scripted::{AccountCall, CallGate, ScriptedAccountService, DEFAULT_OAUTH_URL};
pub use traits::AccountService;
#[cfg(any(test, feature = "testing"))]
pub use traits::MockAccountService;
pub use types::{AccountStatus, AuthorizationStatus, DeviceCapability, DeviceConfig, DeviceType};

// Failures reported by the account service

use thiserror::Error;

/// Coarse classification internal transitions are allowed to branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
    /// The server rejected our credentials
    Authentication,
    /// Anything else: network, server, local storage, timeouts
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Authentication rejected: {0}")]
    Authentication(String),
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("Account service error ({status}): {message}")]
    Service { status: u16, message: String },
    #[error("Account call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    #[error("Account service unavailable: {0}")]
    Unavailable(String),
}

impl AccountError {
    pub fn kind(&self) -> CallErrorKind {
        match self {
            AccountError::Authentication(_) => CallErrorKind::Authentication,
            AccountError::Service { status: 401, .. } => CallErrorKind::Authentication,
            _ => CallErrorKind::Other,
        }
    }

    pub fn network(message: &str) -> Self {
        AccountError::Network {
            message: message.to_string(),
        }
    }
}

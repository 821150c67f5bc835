//! Client error taxonomy
//!
//! Library operations that callers branch on return [`ClientError`]. Startup,
//! configuration and the binary use `eyre` instead.

use thiserror::Error;

use crate::network::{UNRECOGNIZED_CHAIN_CODE, USER_REJECTED_CODE};
use crate::units::UnitsError;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No wallet provider available at all
    #[error("No wallet detected. Install a browser wallet such as MetaMask, or set WALLET_PRIVATE_KEY to use a local key.")]
    ProviderAbsent,

    #[error("Request rejected by user")]
    UserRejected,

    #[error("Wallet not connected")]
    NotConnected,

    /// Provider-level error with an EIP-1193 code
    #[error("Provider error {code}: {message}")]
    Provider { code: i64, message: String },

    /// Ledger read failure (network, RPC, decoding)
    #[error("Read failed: {0}")]
    Read(String),

    /// Write failure or on-chain revert; carries the best available reason
    #[error("{0}")]
    Revert(String),

    #[error("Insufficient USDC. You have {available} but need {required}.")]
    InsufficientBalance { available: String, required: String },

    #[error("Insufficient allowance. Please approve first.")]
    InsufficientAllowance,

    #[error(transparent)]
    InvalidAmount(#[from] UnitsError),

    #[error("Enter an amount greater than zero")]
    ZeroAmount,

    /// Operation not available in the current flow step
    #[error("Not available while {0}")]
    InvalidStep(&'static str),
}

impl ClientError {
    /// Build an error from a raw provider code/message pair
    pub fn from_provider(code: i64, message: impl Into<String>) -> Self {
        if code == USER_REJECTED_CODE {
            ClientError::UserRejected
        } else {
            ClientError::Provider {
                code,
                message: message.into(),
            }
        }
    }

    /// Classify a write error message from the transport/contract layer
    pub fn from_write_failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains(&USER_REJECTED_CODE.to_string())
        {
            ClientError::UserRejected
        } else {
            ClientError::Revert(message)
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        matches!(self, ClientError::UserRejected)
    }

    /// The wallet does not know the requested chain
    pub fn is_unrecognized_chain(&self) -> bool {
        matches!(self, ClientError::Provider { code, .. } if *code == UNRECOGNIZED_CHAIN_CODE)
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::ProviderAbsent => "provider_absent",
            ClientError::UserRejected => "user_rejected",
            ClientError::NotConnected => "not_connected",
            ClientError::Provider { .. } => "provider",
            ClientError::Read(_) => "read",
            ClientError::Revert(_) => "revert",
            ClientError::InsufficientBalance { .. } => "insufficient_balance",
            ClientError::InsufficientAllowance => "insufficient_allowance",
            ClientError::InvalidAmount(_) | ClientError::ZeroAmount => "invalid_amount",
            ClientError::InvalidStep(_) => "invalid_step",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_code_mapping() {
        assert!(ClientError::from_provider(4001, "denied").is_user_rejected());
        assert!(ClientError::from_provider(4902, "unknown chain").is_unrecognized_chain());
        assert!(!ClientError::from_provider(-32603, "internal").is_unrecognized_chain());
    }

    #[test]
    fn test_write_failure_classification() {
        assert!(ClientError::from_write_failure("User rejected the request.").is_user_rejected());
        assert_eq!(
            ClientError::from_write_failure("execution reverted: Presale: hard cap reached"),
            ClientError::Revert("execution reverted: Presale: hard cap reached".to_string())
        );
    }

    #[test]
    fn test_insufficient_balance_message() {
        let err = ClientError::InsufficientBalance {
            available: "500.75".to_string(),
            required: "600".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient USDC. You have 500.75 but need 600."
        );
        assert_eq!(err.kind(), "insufficient_balance");
    }
}

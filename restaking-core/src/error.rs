//! Error types for the restaking domain model

use thiserror::Error;

/// Result type for domain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors
#[derive(Error, Debug)]
pub enum Error {
    /// Delegation target does not exist
    #[error("target not found: {kind} {id}")]
    TargetNotFound {
        /// Kind of the missing target
        kind: crate::TargetKind,
        /// Identifier of the missing target
        id: u32,
    },

    /// Delegation target exists but is not accepting delegations
    #[error("target not active: {kind} {id}")]
    TargetNotActive {
        /// Kind of the inactive target
        kind: crate::TargetKind,
        /// Identifier of the inactive target
        id: u32,
    },

    /// Target has outstanding shares but zero tokens for a denom
    #[error("cannot delegate to a target with an invalid (zero) exchange rate")]
    InvalidExchangeRate,

    /// No delegation exists for the (target, delegator) pair
    #[error("delegation not found")]
    DelegationNotFound,

    /// Shares amount is negative, exceeds holdings, or is otherwise unusable
    #[error("invalid shares amount: {0}")]
    InvalidShares(String),

    /// Unbonding delegation already holds the configured maximum entries
    #[error("too many unbonding delegation entries for this delegator and target")]
    MaxUnbondingEntriesExceeded,

    /// A hook subscriber rejected the operation
    #[error("hook rejected operation: {0}")]
    HookRejected(anyhow::Error),

    /// Denom is not in the configured allow-list
    #[error("denom not restakable: {0}")]
    DenomNotRestakable(String),

    /// Malformed denom
    #[error("invalid denom: {0}")]
    InvalidDenom(String),

    /// Malformed account address
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid module parameters
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_rejected_preserves_cause() {
        let err = Error::HookRejected(anyhow::anyhow!("consumer says no"));
        assert!(err.to_string().contains("consumer says no"));
    }
}

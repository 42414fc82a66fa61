//! Engine error taxonomy

use thiserror::Error;

/// Convenience alias for engine results
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while driving the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Domain-level violation surfaced by the accounting model
    #[error(transparent)]
    Core(#[from] restaking_core::Error),

    /// Underlying key-value store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Record failed to encode or decode
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or was rejected
    #[error("config error: {0}")]
    Config(String),

    /// A collaborator (ledger, registry, oracle) failed
    #[error("collaborator error: {0}")]
    Collaborator(anyhow::Error),

    /// Delegator balance too small for the requested delegation
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Aggregate restaked value would exceed the configured cap
    #[error("restaking cap exceeded: total value {total} + delegation value {added} > cap {cap}")]
    RestakingCapExceeded {
        /// Oracle value already restaked
        total: rust_decimal::Decimal,
        /// Oracle value of the new delegation
        added: rust_decimal::Decimal,
        /// Configured cap
        cap: rust_decimal::Decimal,
    },

    /// Caller is not the configured authority
    #[error("unauthorized: expected authority {expected}, got {actual}")]
    Unauthorized {
        /// Configured authority address
        expected: String,
        /// Address that made the call
        actual: String,
    },

    /// Genesis state failed validation
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),

    /// A state invariant no longer holds
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

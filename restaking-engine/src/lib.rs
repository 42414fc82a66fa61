//! Restaking Engine
//!
//! Persistent multi-target delegation engine: shares accounting against
//! pools, operators and services, a time-indexed unbonding queue and
//! genesis import/export, all on RocksDB.
//!
//! # Architecture
//!
//! - **Staged writes**: Every operation builds one `WriteBatch` and commits
//!   after its last fallible step
//! - **Explicit time**: Height and block time arrive in a [`BlockContext`],
//!   never sampled from the clock
//! - **Thin custody**: Token balances live in an external ledger reached
//!   through the [`LedgerKeeper`] trait; the engine only tracks shares
//!
//! [`BlockContext`]: restaking_core::BlockContext
//! [`LedgerKeeper`]: external::LedgerKeeper

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod genesis;
pub mod invariants;
pub mod storage;
pub mod testutil;
pub mod unbond;

// Re-exports
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use external::{LedgerKeeper, PricingOracle, TargetRegistry};
pub use genesis::GenesisState;
pub use storage::{QueueKey, Storage};
pub use unbond::{UnbondResponse, UnbondingCompletion};

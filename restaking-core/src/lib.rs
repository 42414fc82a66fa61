//! Restaking domain model
//!
//! Pure accounting types for a multi-target restaking platform: users
//! delegate tokens to pools, operators or services and receive proportional
//! shares, redeemable later through a time-locked unbonding process.
//!
//! # Invariants
//!
//! - Share conservation: for every target and denom, the target's
//!   `delegator_shares` equals the sum of shares across all delegations
//!   referencing it
//! - Denom isolation: multi-denom targets keep one independent token/shares
//!   ledger per denom; delegating denom A never moves denom B's rate
//! - Rounding direction: share issuance is exact, token withdrawal is
//!   floored, so escrowed balances never fall below the target's books

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod coins;
pub mod delegation;
pub mod error;
pub mod hooks;
pub mod params;
pub mod target;
pub mod types;

// Re-exports
pub use coins::{Coins, DecCoins};
pub use delegation::{Delegation, UnbondingDelegation, UnbondingEntry};
pub use error::{Error, Result};
pub use hooks::{MultiHooks, RestakingHooks};
pub use params::Params;
pub use target::{Operator, Pool, Service, Target};
pub use types::{Address, BlockContext, Denom, TargetKind, TargetStatus};

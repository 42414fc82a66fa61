//! Collaborator boundaries
//!
//! The engine owns delegation accounting only. Token custody, target
//! registration and pricing live behind these traits so the surrounding
//! system supplies them.

use restaking_core::{Address, Coins, Target, TargetKind};
use rust_decimal::Decimal;

/// External token ledger. Holds every balance; the engine only asks it to
/// move tokens between accounts.
pub trait LedgerKeeper {
    /// Move `amount` from `from` to `to`. Must fail if `from` cannot cover
    /// the amount; on success the tokens are gone from `from`.
    fn transfer(&self, from: &Address, to: &Address, amount: &Coins) -> anyhow::Result<()>;
}

/// External registry of delegation targets
pub trait TargetRegistry {
    /// Look up one target, `None` if it does not exist
    fn get(&self, kind: TargetKind, id: u32) -> anyhow::Result<Option<Target>>;

    /// Persist an updated target
    fn save(&self, target: &Target) -> anyhow::Result<()>;

    /// Every registered target. Used for the restaking cap and the share
    /// conservation check.
    fn all(&self) -> anyhow::Result<Vec<Target>>;
}

/// Price source used by the restaking cap
pub trait PricingOracle {
    /// Aggregate value of the given coins in the cap's unit of account
    fn value_of(&self, coins: &Coins) -> anyhow::Result<Decimal>;
}

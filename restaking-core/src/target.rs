//! Delegation targets and their token/shares exchange-rate model
//!
//! A target keeps, per denom, a pair `(tokens, delegator_shares)`. The
//! exchange rate is `tokens / delegator_shares`; it starts at one (the first
//! delegation issues shares 1:1) and rises as the target accrues tokens
//! without issuing shares. A `Pool` runs exactly one such ledger;
//! `Operator` and `Service` run one per denom, fully independent of each
//! other.
//!
//! Rounding rules:
//! - issuance (`add_tokens`) keeps the full-precision quotient, no
//!   truncation
//! - withdrawal (`remove_del_shares`) floors the token payout, leaving any
//!   fraction in the target; the last delegator of a denom receives the
//!   whole remaining balance including accumulated dust

use crate::coins::{Coins, DecCoins};
use crate::types::{Address, Denom, TargetKind, TargetStatus};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept by the truncated share conversion
const SHARES_SCALE: u32 = 18;

/// Single-denom liquidity pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Unique pool identifier
    pub id: u32,
    /// Escrow account address
    pub address: Address,
    /// The one denom this pool accepts
    pub denom: Denom,
    /// Delegated tokens held
    pub tokens: u64,
    /// Total shares issued to delegators
    pub delegator_shares: Decimal,
}

impl Pool {
    /// Create an empty pool
    pub fn new(id: u32, address: Address, denom: Denom) -> Self {
        Self {
            id,
            address,
            denom,
            tokens: 0,
            delegator_shares: Decimal::ZERO,
        }
    }
}

/// Multi-denom operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Unique operator identifier
    pub id: u32,
    /// Escrow account address
    pub address: Address,
    /// Activation status
    pub status: TargetStatus,
    /// Delegated tokens held, per denom
    pub tokens: Coins,
    /// Total shares issued to delegators, per denom
    pub delegator_shares: DecCoins,
}

impl Operator {
    /// Create an empty active operator
    pub fn new(id: u32, address: Address) -> Self {
        Self {
            id,
            address,
            status: TargetStatus::Active,
            tokens: Coins::new(),
            delegator_shares: DecCoins::new(),
        }
    }
}

/// Multi-denom service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Unique service identifier
    pub id: u32,
    /// Escrow account address
    pub address: Address,
    /// Activation status
    pub status: TargetStatus,
    /// Delegated tokens held, per denom
    pub tokens: Coins,
    /// Total shares issued to delegators, per denom
    pub delegator_shares: DecCoins,
}

impl Service {
    /// Create an empty active service
    pub fn new(id: u32, address: Address) -> Self {
        Self {
            id,
            address,
            status: TargetStatus::Active,
            tokens: Coins::new(),
            delegator_shares: DecCoins::new(),
        }
    }
}

/// Any entity a delegation can point at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Single-denom liquidity pool
    Pool(Pool),
    /// Multi-denom operator
    Operator(Operator),
    /// Multi-denom service
    Service(Service),
}

impl Target {
    /// Kind discriminant
    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Pool(_) => TargetKind::Pool,
            Target::Operator(_) => TargetKind::Operator,
            Target::Service(_) => TargetKind::Service,
        }
    }

    /// Target identifier
    pub fn id(&self) -> u32 {
        match self {
            Target::Pool(p) => p.id,
            Target::Operator(o) => o.id,
            Target::Service(s) => s.id,
        }
    }

    /// Escrow account address
    pub fn address(&self) -> &Address {
        match self {
            Target::Pool(p) => &p.address,
            Target::Operator(o) => &o.address,
            Target::Service(s) => &s.address,
        }
    }

    /// Whether the target accepts new delegations. Pools have no status and
    /// are always active.
    pub fn is_active(&self) -> bool {
        match self {
            Target::Pool(_) => true,
            Target::Operator(o) => o.status == TargetStatus::Active,
            Target::Service(s) => s.status == TargetStatus::Active,
        }
    }

    /// Delegated tokens held, per denom
    pub fn tokens(&self) -> Coins {
        match self {
            Target::Pool(p) => Coins::one(p.denom.clone(), p.tokens),
            Target::Operator(o) => o.tokens.clone(),
            Target::Service(s) => s.tokens.clone(),
        }
    }

    /// Total shares issued to delegators, per denom
    pub fn delegator_shares(&self) -> DecCoins {
        match self {
            Target::Pool(p) => DecCoins::one(p.denom.clone(), p.delegator_shares),
            Target::Operator(o) => o.delegator_shares.clone(),
            Target::Service(s) => s.delegator_shares.clone(),
        }
    }

    /// True if any denom has outstanding shares against zero tokens, e.g.
    /// after the target lost its whole balance to slashing. Such a target
    /// must reject all further delegations for that denom.
    pub fn invalid_ex_rate(&self) -> bool {
        let tokens = self.tokens();
        self.delegator_shares()
            .iter()
            .any(|(denom, shares)| *shares > Decimal::ZERO && tokens.amount_of(denom) == 0)
    }

    /// Share worth of the given token amounts at the current rate,
    /// full precision. Fails for denoms the target holds no tokens of.
    pub fn shares_from_tokens(&self, amount: &Coins) -> crate::Result<DecCoins> {
        self.convert_tokens(amount, false)
    }

    /// Share worth of the given token amounts, quotient truncated toward
    /// zero at the shares scale
    pub fn shares_from_tokens_truncated(&self, amount: &Coins) -> crate::Result<DecCoins> {
        self.convert_tokens(amount, true)
    }

    fn convert_tokens(&self, amount: &Coins, truncate: bool) -> crate::Result<DecCoins> {
        let tokens = self.tokens();
        let total_shares = self.delegator_shares();

        let mut shares = DecCoins::new();
        for (denom, amt) in amount.iter() {
            let target_tokens = tokens.amount_of(denom);
            if target_tokens == 0 {
                return Err(crate::Error::InvalidShares(format!(
                    "target holds no {} tokens",
                    denom
                )));
            }
            let mut quotient = total_shares.amount_of(denom) * Decimal::from(*amt)
                / Decimal::from(target_tokens);
            if truncate {
                quotient =
                    quotient.round_dp_with_strategy(SHARES_SCALE, RoundingStrategy::ToZero);
            }
            shares.add_amount(denom.clone(), quotient);
        }

        Ok(shares)
    }

    /// Token worth of the given shares at the current rate, full precision
    pub fn tokens_from_shares(&self, shares: &DecCoins) -> crate::Result<DecCoins> {
        let tokens = self.tokens();
        let total_shares = self.delegator_shares();

        let mut worth = DecCoins::new();
        for (denom, amount) in shares.iter() {
            let denom_shares = total_shares.amount_of(denom);
            if denom_shares.is_zero() {
                return Err(crate::Error::InvalidShares(format!(
                    "target has no outstanding {} shares",
                    denom
                )));
            }
            let value = *amount * Decimal::from(tokens.amount_of(denom)) / denom_shares;
            worth.add_amount(denom.clone(), value);
        }

        Ok(worth)
    }

    /// Add delegated tokens and issue the corresponding shares.
    ///
    /// The first delegation of a denom sets the exchange rate to one; later
    /// delegations are issued `amount * shares / tokens` with no truncation.
    /// Returns the issued shares.
    pub fn add_tokens(&mut self, amount: &Coins) -> crate::Result<DecCoins> {
        self.check_denoms(amount)?;

        let tokens = self.tokens();
        let total_shares = self.delegator_shares();

        let mut issued = DecCoins::new();
        for (denom, amt) in amount.iter() {
            let existing_shares = total_shares.amount_of(denom);
            let shares = if existing_shares.is_zero() {
                Decimal::from(*amt)
            } else {
                existing_shares * Decimal::from(*amt) / Decimal::from(tokens.amount_of(denom))
            };
            issued.add_amount(denom.clone(), shares);
        }

        for (denom, amt) in amount.iter() {
            self.credit(denom, *amt, issued.amount_of(denom));
        }

        Ok(issued)
    }

    /// Remove delegator shares and return the token payout.
    ///
    /// The payout is floored per denom; when the removed shares are the
    /// denom's last outstanding shares, the whole remaining token balance is
    /// paid out instead so rounding dust is not stranded.
    pub fn remove_del_shares(&mut self, del_shares: &DecCoins) -> crate::Result<Coins> {
        let tokens = self.tokens();
        let total_shares = self.delegator_shares();

        let mut payout = Coins::new();
        for (denom, removed) in del_shares.iter() {
            let denom_shares = total_shares.amount_of(denom);
            let remaining = denom_shares - removed;
            if remaining < Decimal::ZERO {
                return Err(crate::Error::InvalidShares(format!(
                    "removing {} {} shares but only {} outstanding",
                    removed, denom, denom_shares
                )));
            }

            let denom_tokens = tokens.amount_of(denom);
            let amount = if remaining.is_zero() {
                // Last delegation of this denom gets any trimmings
                denom_tokens
            } else {
                let worth = *removed * Decimal::from(denom_tokens) / denom_shares;
                decimal_to_u64_floor(worth)
            };

            payout.add_amount(denom.clone(), amount);
            self.debit(denom, amount, *removed);
        }

        Ok(payout)
    }

    fn check_denoms(&self, amount: &Coins) -> crate::Result<()> {
        if let Target::Pool(p) = self {
            for denom in amount.denoms() {
                if *denom != p.denom {
                    return Err(crate::Error::DenomNotRestakable(format!(
                        "pool {} only accepts {}, got {}",
                        p.id, p.denom, denom
                    )));
                }
            }
        }
        Ok(())
    }

    fn credit(&mut self, denom: &Denom, amount: u64, shares: Decimal) {
        match self {
            Target::Pool(p) => {
                p.tokens = p.tokens.saturating_add(amount);
                p.delegator_shares += shares;
            }
            Target::Operator(o) => {
                o.tokens.add_amount(denom.clone(), amount);
                o.delegator_shares.add_amount(denom.clone(), shares);
            }
            Target::Service(s) => {
                s.tokens.add_amount(denom.clone(), amount);
                s.delegator_shares.add_amount(denom.clone(), shares);
            }
        }
    }

    fn debit(&mut self, denom: &Denom, amount: u64, shares: Decimal) {
        match self {
            Target::Pool(p) => {
                p.tokens -= amount;
                p.delegator_shares -= shares;
            }
            Target::Operator(o) => {
                let held = o.tokens.amount_of(denom);
                o.tokens.set_amount(denom.clone(), held - amount);
                let held_shares = o.delegator_shares.amount_of(denom);
                o.delegator_shares.set_amount(denom.clone(), held_shares - shares);
            }
            Target::Service(s) => {
                let held = s.tokens.amount_of(denom);
                s.tokens.set_amount(denom.clone(), held - amount);
                let held_shares = s.delegator_shares.amount_of(denom);
                s.delegator_shares.set_amount(denom.clone(), held_shares - shares);
            }
        }
    }
}

/// Floor a non-negative decimal token worth to whole ledger units
fn decimal_to_u64_floor(value: Decimal) -> u64 {
    use rust_decimal::prelude::ToPrimitive;
    value.trunc().to_u64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Target {
        Target::Pool(Pool::new(1, Address::new("pool-1"), Denom::new("umilk")))
    }

    fn operator() -> Target {
        Target::Operator(Operator::new(2, Address::new("operator-2")))
    }

    #[test]
    fn test_pool_tokens_saturate_at_u64_max() {
        let mut target = pool();
        target
            .add_tokens(&Coins::one(Denom::new("umilk"), u64::MAX - 5))
            .unwrap();
        target
            .add_tokens(&Coins::one(Denom::new("umilk"), 10))
            .unwrap();
        assert_eq!(target.tokens().amount_of(&Denom::new("umilk")), u64::MAX);
    }

    #[test]
    fn test_first_delegation_rate_is_one() {
        let mut target = pool();
        let issued = target
            .add_tokens(&Coins::one(Denom::new("umilk"), 100))
            .unwrap();
        assert_eq!(issued.amount_of(&Denom::new("umilk")), Decimal::from(100));
        assert_eq!(target.tokens().amount_of(&Denom::new("umilk")), 100);
    }

    #[test]
    fn test_issuance_follows_exchange_rate() {
        // T=20, S=100 => rate 0.2, delegating 100 issues 500 shares
        let mut target = Target::Pool(Pool {
            id: 1,
            address: Address::new("pool-1"),
            denom: Denom::new("umilk"),
            tokens: 20,
            delegator_shares: Decimal::from(100),
        });

        let issued = target
            .add_tokens(&Coins::one(Denom::new("umilk"), 100))
            .unwrap();
        assert_eq!(issued.amount_of(&Denom::new("umilk")), Decimal::from(500));
        assert_eq!(target.tokens().amount_of(&Denom::new("umilk")), 120);
        assert_eq!(
            target.delegator_shares().amount_of(&Denom::new("umilk")),
            Decimal::from(600)
        );
    }

    #[test]
    fn test_remove_shares_floors_payout() {
        // T=120, S=600: removing 500 shares pays floor(120*500/600) = 100
        let mut target = Target::Pool(Pool {
            id: 1,
            address: Address::new("pool-1"),
            denom: Denom::new("umilk"),
            tokens: 120,
            delegator_shares: Decimal::from(600),
        });

        let payout = target
            .remove_del_shares(&DecCoins::one(Denom::new("umilk"), Decimal::from(500)))
            .unwrap();
        assert_eq!(payout.amount_of(&Denom::new("umilk")), 100);
        assert_eq!(target.tokens().amount_of(&Denom::new("umilk")), 20);
        assert_eq!(
            target.delegator_shares().amount_of(&Denom::new("umilk")),
            Decimal::from(100)
        );
    }

    #[test]
    fn test_last_delegator_gets_trimmings() {
        let mut target = Target::Pool(Pool {
            id: 1,
            address: Address::new("pool-1"),
            denom: Denom::new("umilk"),
            tokens: 7,
            delegator_shares: Decimal::from(3),
        });

        let payout = target
            .remove_del_shares(&DecCoins::one(Denom::new("umilk"), Decimal::from(3)))
            .unwrap();
        // 7 tokens over 3 shares: a partial withdraw would floor, the last
        // one collects everything
        assert_eq!(payout.amount_of(&Denom::new("umilk")), 7);
        assert_eq!(target.tokens().amount_of(&Denom::new("umilk")), 0);
        assert!(target.delegator_shares().is_zero());
    }

    #[test]
    fn test_invalid_ex_rate() {
        let target = Target::Pool(Pool {
            id: 1,
            address: Address::new("pool-1"),
            denom: Denom::new("umilk"),
            tokens: 0,
            delegator_shares: Decimal::from(100),
        });
        assert!(target.invalid_ex_rate());

        assert!(!pool().invalid_ex_rate());
    }

    #[test]
    fn test_multi_denom_ledgers_are_independent() {
        let mut target = operator();
        target
            .add_tokens(&Coins::one(Denom::new("ub"), 50))
            .unwrap();
        let rate_b_before = target.delegator_shares().amount_of(&Denom::new("ub"));

        target
            .add_tokens(&Coins::one(Denom::new("ua"), 100))
            .unwrap();

        assert_eq!(
            target.delegator_shares().amount_of(&Denom::new("ub")),
            rate_b_before
        );
        assert_eq!(
            target.delegator_shares().amount_of(&Denom::new("ua")),
            Decimal::from(100)
        );
    }

    #[test]
    fn test_pool_rejects_foreign_denom() {
        let mut target = pool();
        let result = target.add_tokens(&Coins::one(Denom::new("stake"), 10));
        assert!(matches!(
            result,
            Err(crate::Error::DenomNotRestakable(_))
        ));
    }

    #[test]
    fn test_shares_from_tokens_requires_tokens() {
        let target = pool();
        let result = target.shares_from_tokens(&Coins::one(Denom::new("umilk"), 10));
        assert!(matches!(result, Err(crate::Error::InvalidShares(_))));
    }

    #[test]
    fn test_remove_more_shares_than_outstanding_fails() {
        let mut target = pool();
        target
            .add_tokens(&Coins::one(Denom::new("umilk"), 10))
            .unwrap();
        let result =
            target.remove_del_shares(&DecCoins::one(Denom::new("umilk"), Decimal::from(11)));
        assert!(matches!(result, Err(crate::Error::InvalidShares(_))));
    }
}

//! Multi-denom amount arithmetic
//!
//! `Coins` tracks whole token amounts as held by the external ledger;
//! `DecCoins` tracks fractional share amounts. Both are normalized, sorted
//! maps: zero amounts are never stored, iteration order is the denom order.

use crate::types::Denom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A set of whole token amounts keyed by denom
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coins(BTreeMap<Denom, u64>);

impl Coins {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-denom set; a zero amount yields the empty set
    pub fn one(denom: Denom, amount: u64) -> Self {
        let mut coins = Self::new();
        coins.add_amount(denom, amount);
        coins
    }

    /// Amount held for the given denom, zero if absent
    pub fn amount_of(&self, denom: &Denom) -> u64 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    /// Add a single amount
    pub fn add_amount(&mut self, denom: Denom, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.0.entry(denom).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Add every amount from `other`
    pub fn add(&mut self, other: &Coins) {
        for (denom, amount) in other.iter() {
            self.add_amount(denom.clone(), *amount);
        }
    }

    /// Set the amount for a denom, removing the entry when zero
    pub fn set_amount(&mut self, denom: Denom, amount: u64) {
        if amount == 0 {
            self.0.remove(&denom);
        } else {
            self.0.insert(denom, amount);
        }
    }

    /// Subtract `other`, returning `None` if any denom would go negative
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut result = self.clone();
        for (denom, amount) in other.iter() {
            let held = result.amount_of(denom);
            let remaining = held.checked_sub(*amount)?;
            result.set_amount(denom.clone(), remaining);
        }
        Some(result)
    }

    /// True when no denom holds a positive amount
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of denoms held
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set holds no denom
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate amounts in denom order
    pub fn iter(&self) -> impl Iterator<Item = (&Denom, &u64)> {
        self.0.iter()
    }

    /// Denoms held, in order
    pub fn denoms(&self) -> impl Iterator<Item = &Denom> {
        self.0.keys()
    }

    /// Check every denom is well formed (amounts are non-zero by construction)
    pub fn validate(&self) -> crate::Result<()> {
        for denom in self.denoms() {
            denom.validate()?;
        }
        Ok(())
    }
}

impl FromIterator<(Denom, u64)> for Coins {
    fn from_iter<I: IntoIterator<Item = (Denom, u64)>>(iter: I) -> Self {
        let mut coins = Coins::new();
        for (denom, amount) in iter {
            coins.add_amount(denom, amount);
        }
        coins
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{}{}", amount, denom))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A set of fractional amounts keyed by denom, used for delegation shares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecCoins(BTreeMap<Denom, Decimal>);

impl DecCoins {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-denom set; a zero amount yields the empty set
    pub fn one(denom: Denom, amount: Decimal) -> Self {
        let mut coins = Self::new();
        coins.add_amount(denom, amount);
        coins
    }

    /// Amount held for the given denom, zero if absent
    pub fn amount_of(&self, denom: &Denom) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    /// Add a single amount
    pub fn add_amount(&mut self, denom: Denom, amount: Decimal) {
        if amount.is_zero() {
            return;
        }
        let entry = self.0.entry(denom.clone()).or_insert(Decimal::ZERO);
        *entry += amount;
        if entry.is_zero() {
            self.0.remove(&denom);
        }
    }

    /// Add every amount from `other`
    pub fn add(&mut self, other: &DecCoins) {
        for (denom, amount) in other.iter() {
            self.add_amount(denom.clone(), *amount);
        }
    }

    /// Set the amount for a denom, removing the entry when zero
    pub fn set_amount(&mut self, denom: Denom, amount: Decimal) {
        if amount.is_zero() {
            self.0.remove(&denom);
        } else {
            self.0.insert(denom, amount);
        }
    }

    /// Subtract `other`, returning `None` if any denom would go negative
    pub fn checked_sub(&self, other: &DecCoins) -> Option<DecCoins> {
        let mut result = self.clone();
        for (denom, amount) in other.iter() {
            let remaining = result.amount_of(denom) - amount;
            if remaining < Decimal::ZERO {
                return None;
            }
            result.set_amount(denom.clone(), remaining);
        }
        Some(result)
    }

    /// True when no denom holds a non-zero amount
    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the set holds no denom
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of denoms held
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate amounts in denom order
    pub fn iter(&self) -> impl Iterator<Item = (&Denom, &Decimal)> {
        self.0.iter()
    }

    /// Denoms held, in order
    pub fn denoms(&self) -> impl Iterator<Item = &Denom> {
        self.0.keys()
    }

    /// True if any amount is negative
    pub fn is_any_negative(&self) -> bool {
        self.0.values().any(|amount| amount.is_sign_negative())
    }

    /// True if, for any denom, `self` holds strictly more than `other`
    /// (missing denoms count as zero)
    pub fn is_any_gt(&self, other: &DecCoins) -> bool {
        self.iter()
            .any(|(denom, amount)| *amount > other.amount_of(denom))
    }

    /// True if, for every denom in `other`, `self` holds at least as much
    pub fn is_all_gte(&self, other: &DecCoins) -> bool {
        other
            .iter()
            .all(|(denom, amount)| self.amount_of(denom) >= *amount)
    }

    /// Check every denom is well formed and no amount is negative
    pub fn validate(&self) -> crate::Result<()> {
        for (denom, amount) in self.iter() {
            denom.validate()?;
            if amount.is_sign_negative() {
                return Err(crate::Error::InvalidShares(format!(
                    "negative amount for {}",
                    denom
                )));
            }
        }
        Ok(())
    }
}

impl From<&Coins> for DecCoins {
    fn from(coins: &Coins) -> Self {
        coins
            .iter()
            .map(|(denom, amount)| (denom.clone(), Decimal::from(*amount)))
            .collect()
    }
}

impl FromIterator<(Denom, Decimal)> for DecCoins {
    fn from_iter<I: IntoIterator<Item = (Denom, Decimal)>>(iter: I) -> Self {
        let mut coins = DecCoins::new();
        for (denom, amount) in iter {
            coins.add_amount(denom, amount);
        }
        coins
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{}{}", amount, denom))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denom(s: &str) -> Denom {
        Denom::new(s)
    }

    #[test]
    fn test_coins_normalized() {
        let coins = Coins::one(denom("umilk"), 0);
        assert!(coins.is_zero());

        let mut coins = Coins::one(denom("umilk"), 100);
        coins.add_amount(denom("umilk"), 50);
        assert_eq!(coins.amount_of(&denom("umilk")), 150);
        assert_eq!(coins.len(), 1);

        coins.set_amount(denom("umilk"), 0);
        assert!(coins.is_zero());
    }

    #[test]
    fn test_coins_add_saturates_at_u64_max() {
        let mut coins = Coins::one(denom("umilk"), u64::MAX - 10);
        coins.add_amount(denom("umilk"), 100);
        assert_eq!(coins.amount_of(&denom("umilk")), u64::MAX);
    }

    #[test]
    fn test_coins_checked_sub() {
        let mut coins = Coins::one(denom("umilk"), 100);
        coins.add_amount(denom("stake"), 20);

        let smaller = Coins::one(denom("umilk"), 40);
        let diff = coins.checked_sub(&smaller).unwrap();
        assert_eq!(diff.amount_of(&denom("umilk")), 60);
        assert_eq!(diff.amount_of(&denom("stake")), 20);

        let too_much = Coins::one(denom("stake"), 21);
        assert!(coins.checked_sub(&too_much).is_none());
    }

    #[test]
    fn test_dec_coins_is_any_gt() {
        let a: DecCoins = [
            (denom("ua"), Decimal::from(2)),
            (denom("ub"), Decimal::from(3)),
        ]
        .into_iter()
        .collect();

        let bigger: DecCoins = [
            (denom("ua"), Decimal::from(5)),
            (denom("ub"), Decimal::from(5)),
        ]
        .into_iter()
        .collect();
        assert!(!a.is_any_gt(&bigger));
        assert!(bigger.is_any_gt(&a));

        // A denom the other side lacks counts against its zero
        let only_a = DecCoins::one(denom("ua"), Decimal::from(5));
        assert!(a.is_any_gt(&only_a));

        // Missing denoms count as zero
        assert!(a.is_any_gt(&DecCoins::new()));
        assert!(!DecCoins::new().is_any_gt(&a));
    }

    #[test]
    fn test_dec_coins_is_all_gte() {
        let owned: DecCoins = [
            (denom("ua"), Decimal::from(10)),
            (denom("ub"), Decimal::from(5)),
        ]
        .into_iter()
        .collect();

        let within = DecCoins::one(denom("ua"), Decimal::from(10));
        assert!(owned.is_all_gte(&within));

        let beyond = DecCoins::one(denom("uc"), Decimal::ONE);
        assert!(!owned.is_all_gte(&beyond));

        assert!(owned.is_all_gte(&DecCoins::new()));
    }

    #[test]
    fn test_dec_coins_sub_to_zero_removes_entry() {
        let owned = DecCoins::one(denom("ua"), Decimal::from(10));
        let all = DecCoins::one(denom("ua"), Decimal::from(10));
        let diff = owned.checked_sub(&all).unwrap();
        assert!(diff.is_zero());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn test_display_sorted() {
        let mut coins = Coins::new();
        coins.add_amount(denom("umilk"), 7);
        coins.add_amount(denom("stake"), 3);
        assert_eq!(coins.to_string(), "3stake,7umilk");
    }
}

//! Delegations and unbonding delegations

use crate::coins::{Coins, DecCoins};
use crate::types::{Address, TargetKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A delegator's share position against one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Delegator account
    pub delegator: Address,
    /// Kind of the delegated-to target
    pub target_kind: TargetKind,
    /// Identifier of the delegated-to target
    pub target_id: u32,
    /// Shares held, per denom
    pub shares: DecCoins,
}

impl Delegation {
    /// Create a delegation with no shares yet
    pub fn new(delegator: Address, target_kind: TargetKind, target_id: u32) -> Self {
        Self {
            delegator,
            target_kind,
            target_id,
            shares: DecCoins::new(),
        }
    }

    /// Basic well-formedness: valid addresses, non-zero target, no
    /// negative share amounts
    pub fn validate(&self) -> crate::Result<()> {
        self.delegator.validate()?;
        if self.target_id == 0 {
            return Err(crate::Error::InvalidShares(
                "delegation target id must be non-zero".to_string(),
            ));
        }
        if self.shares.is_any_negative() {
            return Err(crate::Error::InvalidShares(format!(
                "delegation of {} has negative shares",
                self.delegator
            )));
        }
        Ok(())
    }
}

/// One tranche of tokens working their way out of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    /// Block height the unbonding started at
    pub creation_height: u64,
    /// Instant the tokens become claimable
    pub completion_time: DateTime<Utc>,
    /// Tokens at the start of the unbonding, per denom
    pub initial_balance: Coins,
    /// Tokens still unbonding, per denom. Diverges from `initial_balance`
    /// when the entry is slashed mid-flight.
    pub balance: Coins,
    /// Globally unique entry identifier
    pub unbonding_id: u64,
}

impl UnbondingEntry {
    /// Whether the entry's completion time has passed at `now`
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        self.completion_time <= now
    }

    /// Basic well-formedness of the entry's balances
    pub fn validate(&self) -> crate::Result<()> {
        self.initial_balance.validate()?;
        self.balance.validate()?;
        Ok(())
    }
}

/// All unbonding tranches of one delegator against one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    /// Delegator account
    pub delegator: Address,
    /// Kind of the target being unbonded from
    pub target_kind: TargetKind,
    /// Identifier of the target being unbonded from
    pub target_id: u32,
    /// Outstanding tranches, oldest first
    pub entries: Vec<UnbondingEntry>,
}

impl UnbondingDelegation {
    /// Create an unbonding delegation with no entries
    pub fn new(delegator: Address, target_kind: TargetKind, target_id: u32) -> Self {
        Self {
            delegator,
            target_kind,
            target_id,
            entries: Vec::new(),
        }
    }

    /// Whether a new tranche at `(creation_height, completion_time)` would
    /// merge into an existing entry instead of appending
    pub fn can_coalesce(&self, creation_height: u64, completion_time: DateTime<Utc>) -> bool {
        self.entries.iter().any(|entry| {
            entry.creation_height == creation_height && entry.completion_time == completion_time
        })
    }

    /// Record a tranche. A tranche matching an existing entry's creation
    /// height and completion time merges into it, keeping the existing
    /// entry id; otherwise a fresh entry is appended. Returns `true` when
    /// the tranche coalesced.
    pub fn add_entry(
        &mut self,
        creation_height: u64,
        completion_time: DateTime<Utc>,
        balance: Coins,
        unbonding_id: u64,
    ) -> bool {
        for entry in &mut self.entries {
            if entry.creation_height == creation_height
                && entry.completion_time == completion_time
            {
                entry.initial_balance.add(&balance);
                entry.balance.add(&balance);
                return true;
            }
        }

        self.entries.push(UnbondingEntry {
            creation_height,
            completion_time,
            initial_balance: balance.clone(),
            balance,
            unbonding_id,
        });
        false
    }

    /// Drop the entry at `index`
    pub fn remove_entry(&mut self, index: usize) {
        self.entries.remove(index);
    }

    /// Basic well-formedness of the record and all its entries
    pub fn validate(&self) -> crate::Result<()> {
        self.delegator.validate()?;
        if self.target_id == 0 {
            return Err(crate::Error::InvalidShares(
                "unbonding delegation target id must be non-zero".to_string(),
            ));
        }
        for entry in &self.entries {
            entry.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Denom;
    use chrono::TimeZone;

    fn when(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn coins(amount: u64) -> Coins {
        Coins::one(Denom::new("umilk"), amount)
    }

    #[test]
    fn test_add_entry_appends() {
        let mut ubd =
            UnbondingDelegation::new(Address::new("alice"), TargetKind::Pool, 1);
        assert!(!ubd.add_entry(10, when(0), coins(100), 1));
        assert!(!ubd.add_entry(11, when(60), coins(50), 2));
        assert_eq!(ubd.entries.len(), 2);
    }

    #[test]
    fn test_add_entry_coalesces_matching_tranche() {
        let mut ubd =
            UnbondingDelegation::new(Address::new("alice"), TargetKind::Pool, 1);
        ubd.add_entry(10, when(0), coins(100), 1);
        assert!(ubd.can_coalesce(10, when(0)));
        assert!(ubd.add_entry(10, when(0), coins(40), 2));

        assert_eq!(ubd.entries.len(), 1);
        let entry = &ubd.entries[0];
        assert_eq!(entry.balance.amount_of(&Denom::new("umilk")), 140);
        assert_eq!(entry.initial_balance.amount_of(&Denom::new("umilk")), 140);
        // Coalescing keeps the original entry id
        assert_eq!(entry.unbonding_id, 1);
    }

    #[test]
    fn test_same_time_different_height_does_not_coalesce() {
        let mut ubd =
            UnbondingDelegation::new(Address::new("alice"), TargetKind::Pool, 1);
        ubd.add_entry(10, when(0), coins(100), 1);
        assert!(!ubd.add_entry(11, when(0), coins(40), 2));
        assert_eq!(ubd.entries.len(), 2);
    }

    #[test]
    fn test_entry_maturity_is_inclusive() {
        let entry = UnbondingEntry {
            creation_height: 10,
            completion_time: when(0),
            initial_balance: coins(100),
            balance: coins(100),
            unbonding_id: 1,
        };
        assert!(entry.is_mature(when(0)));
        assert!(entry.is_mature(when(1)));
        assert!(!entry.is_mature(when(-1)));
    }

    #[test]
    fn test_validate_rejects_zero_target() {
        let ubd = UnbondingDelegation::new(Address::new("alice"), TargetKind::Pool, 0);
        assert!(ubd.validate().is_err());
    }
}

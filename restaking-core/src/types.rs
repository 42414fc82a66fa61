//! Basic identifier and context types shared by the whole crate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token denomination (e.g. "umilk", "stake")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Denom(String);

impl Denom {
    /// Create a new denom
    pub fn new(denom: impl Into<String>) -> Self {
        Self(denom.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the denom is well formed: starts with a letter, then letters,
    /// digits or one of `/ : . _ -`, total length 3..=128
    pub fn validate(&self) -> crate::Result<()> {
        let s = &self.0;
        let mut chars = s.chars();
        let valid_first = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
        if s.len() < 3 || s.len() > 128 || !valid_first || !valid_rest {
            return Err(crate::Error::InvalidDenom(s.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Denom {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Account address, as understood by the external ledger
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a new address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes, used for store key construction
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Check the address is well formed: non-empty printable ASCII without
    /// whitespace, at most 90 characters
    pub fn validate(&self) -> crate::Result<()> {
        let s = &self.0;
        let printable = s
            .chars()
            .all(|c| c.is_ascii_graphic());
        if s.is_empty() || s.len() > 90 || !printable {
            return Err(crate::Error::InvalidAddress(s.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Kind of entity a delegation points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TargetKind {
    /// Single-denom liquidity pool
    Pool = 1,
    /// Multi-denom operator
    Operator = 2,
    /// Multi-denom service
    Service = 3,
}

impl TargetKind {
    /// Store key discriminant
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a store key discriminant
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(TargetKind::Pool),
            2 => Some(TargetKind::Operator),
            3 => Some(TargetKind::Service),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetKind::Pool => "pool",
            TargetKind::Operator => "operator",
            TargetKind::Service => "service",
        };
        write!(f, "{}", s)
    }
}

/// Activation status of an operator or service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    /// Accepting delegations
    Active,
    /// Not accepting delegations
    Inactive,
}

/// Deterministic execution context for one state-transition cycle.
///
/// Height and time are inputs, never sampled: every replica processing the
/// same cycle must observe identical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Current block height
    pub height: u64,
    /// Current block time
    pub time: DateTime<Utc>,
}

impl BlockContext {
    /// Create a new context
    pub fn new(height: u64, time: DateTime<Utc>) -> Self {
        Self { height, time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denom_validation() {
        assert!(Denom::new("umilk").validate().is_ok());
        assert!(Denom::new("ibc/27394FB092D2EC").validate().is_ok());
        assert!(Denom::new("").validate().is_err());
        assert!(Denom::new("ab").validate().is_err());
        assert!(Denom::new("1abc").validate().is_err());
        assert!(Denom::new("bad denom").validate().is_err());
    }

    #[test]
    fn test_address_validation() {
        assert!(Address::new("cosmos1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu").validate().is_ok());
        assert!(Address::new("").validate().is_err());
        assert!(Address::new("has space").validate().is_err());
        assert!(Address::new("a".repeat(91)).validate().is_err());
    }

    #[test]
    fn test_target_kind_roundtrip() {
        for kind in [TargetKind::Pool, TargetKind::Operator, TargetKind::Service] {
            assert_eq!(TargetKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(TargetKind::from_byte(0), None);
    }
}

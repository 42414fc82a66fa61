//! Module-wide governance parameters

use crate::types::Denom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time an unbonding entry waits before maturing
const DEFAULT_UNBONDING_DURATION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Default cap on concurrent unbonding entries per (delegator, target) pair
const DEFAULT_MAX_ENTRIES: u32 = 7;

/// Governance-controlled knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// How long undelegated tokens stay locked before becoming claimable
    pub unbonding_duration: Duration,
    /// Maximum concurrent unbonding entries per (delegator, target) pair.
    /// Tranches that coalesce into an existing entry do not count.
    pub max_entries: u32,
    /// Denoms accepted for restaking. Empty means every denom is accepted.
    pub allowed_denoms: Vec<Denom>,
    /// Cap on the aggregate oracle value of all restaked tokens. Zero
    /// disables the cap.
    pub restaking_cap: Decimal,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            unbonding_duration: DEFAULT_UNBONDING_DURATION,
            max_entries: DEFAULT_MAX_ENTRIES,
            allowed_denoms: Vec::new(),
            restaking_cap: Decimal::ZERO,
        }
    }
}

impl Params {
    /// Whether `denom` may be restaked under these params
    pub fn is_denom_restakable(&self, denom: &Denom) -> bool {
        self.allowed_denoms.is_empty() || self.allowed_denoms.contains(denom)
    }

    /// Validate parameter bounds
    pub fn validate(&self) -> crate::Result<()> {
        if self.unbonding_duration.is_zero() {
            return Err(crate::Error::InvalidParams(
                "unbonding duration must be positive".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(crate::Error::InvalidParams(
                "max entries must be positive".to_string(),
            ));
        }
        for denom in &self.allowed_denoms {
            denom.validate()?;
        }
        if self.restaking_cap.is_sign_negative() {
            return Err(crate::Error::InvalidParams(
                "restaking cap cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Params::default().validate().unwrap();
    }

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let params = Params::default();
        assert!(params.is_denom_restakable(&Denom::new("umilk")));
    }

    #[test]
    fn test_allow_list_filters() {
        let params = Params {
            allowed_denoms: vec![Denom::new("umilk")],
            ..Params::default()
        };
        assert!(params.is_denom_restakable(&Denom::new("umilk")));
        assert!(!params.is_denom_restakable(&Denom::new("stake")));
    }

    #[test]
    fn test_rejects_zero_unbonding_duration() {
        let params = Params {
            unbonding_duration: Duration::ZERO,
            ..Params::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_max_entries() {
        let params = Params {
            max_entries: 0,
            ..Params::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_cap() {
        let params = Params {
            restaking_cap: Decimal::NEGATIVE_ONE,
            ..Params::default()
        };
        assert!(params.validate().is_err());
    }
}

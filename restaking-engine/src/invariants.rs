//! State consistency checks
//!
//! Shares recorded on delegations and shares recorded on targets are two
//! views of the same quantity. They can only drift apart through a bug, so
//! drift is reported as a hard error rather than repaired.

use crate::{
    engine::Engine,
    error::{Error, Result},
};
use restaking_core::DecCoins;

impl Engine {
    /// Check that, for every target, the sum of all delegation shares
    /// equals the target's recorded delegator shares, denom by denom.
    pub fn verify_share_conservation(&self) -> Result<()> {
        for target in self.registry.all().map_err(Error::Collaborator)? {
            let mut delegated = DecCoins::new();
            for delegation in self
                .storage
                .delegations_by_target(target.kind(), target.id())?
            {
                delegated.add(&delegation.shares);
            }

            let recorded = target.delegator_shares();
            if delegated != recorded {
                return Err(Error::InvariantViolation(format!(
                    "target {}/{} records {} delegator shares but delegations sum to {}",
                    target.kind(),
                    target.id(),
                    recorded,
                    delegated
                )));
            }
        }

        Ok(())
    }

    /// Panicking wrapper around [`verify_share_conservation`], for use at
    /// block boundaries where continuing on corrupt state is worse than
    /// halting.
    ///
    /// [`verify_share_conservation`]: Engine::verify_share_conservation
    pub fn assert_share_conservation(&self) {
        if let Err(e) = self.verify_share_conservation() {
            panic!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testutil::{MemLedger, MemRegistry};
    use chrono::{TimeZone, Utc};
    use restaking_core::{Address, BlockContext, Coins, Denom, Pool, Target, TargetKind};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn setup() -> (Engine, MemRegistry, TempDir) {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp.path().to_path_buf();

        let ledger = MemLedger::new();
        let registry = MemRegistry::new();
        registry.put(Target::Pool(Pool::new(
            1,
            Address::new("pool-1"),
            Denom::new("umilk"),
        )));
        ledger.mint(&Address::new("alice"), &Coins::one(Denom::new("umilk"), 1_000));

        let engine = Engine::open(
            &config,
            Box::new(ledger),
            Box::new(registry.clone()),
        )
        .unwrap();
        (engine, registry, temp)
    }

    #[test]
    fn test_holds_after_delegate_and_undelegate() {
        let (engine, _registry, _temp) = setup();
        let ctx = BlockContext::new(1, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        engine
            .delegate(
                &ctx,
                &Address::new("alice"),
                TargetKind::Pool,
                1,
                &Coins::one(Denom::new("umilk"), 100),
            )
            .unwrap();
        engine.verify_share_conservation().unwrap();

        engine
            .undelegate(
                &ctx,
                &Address::new("alice"),
                TargetKind::Pool,
                1,
                &Coins::one(Denom::new("umilk"), 40),
            )
            .unwrap();
        engine.verify_share_conservation().unwrap();
    }

    #[test]
    fn test_detects_drift() {
        let (engine, registry, _temp) = setup();
        let ctx = BlockContext::new(1, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        engine
            .delegate(
                &ctx,
                &Address::new("alice"),
                TargetKind::Pool,
                1,
                &Coins::one(Denom::new("umilk"), 100),
            )
            .unwrap();

        // Corrupt the target's recorded shares behind the engine's back
        registry.put(Target::Pool(Pool {
            id: 1,
            address: Address::new("pool-1"),
            denom: Denom::new("umilk"),
            tokens: 100,
            delegator_shares: Decimal::from(99),
        }));

        let err = engine.verify_share_conservation().unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_assert_panics_on_drift() {
        let (engine, registry, _temp) = setup();
        registry.put(Target::Pool(Pool {
            id: 1,
            address: Address::new("pool-1"),
            denom: Denom::new("umilk"),
            tokens: 0,
            delegator_shares: Decimal::from(5),
        }));

        engine.assert_share_conservation();
    }
}

//! In-memory collaborator doubles for tests and local experimentation

use crate::external::{LedgerKeeper, PricingOracle, TargetRegistry};
use restaking_core::{
    Address, BlockContext, Coins, Denom, RestakingHooks, Target, TargetKind,
};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// In-memory token ledger. Clones share the same balances.
#[derive(Debug, Clone, Default)]
pub struct MemLedger {
    balances: Rc<RefCell<HashMap<Address, Coins>>>,
}

impl MemLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account out of thin air
    pub fn mint(&self, account: &Address, amount: &Coins) {
        let mut balances = self.balances.borrow_mut();
        balances.entry(account.clone()).or_default().add(amount);
    }

    /// Current balance of an account
    pub fn balance_of(&self, account: &Address) -> Coins {
        self.balances
            .borrow()
            .get(account)
            .cloned()
            .unwrap_or_default()
    }
}

impl LedgerKeeper for MemLedger {
    fn transfer(&self, from: &Address, to: &Address, amount: &Coins) -> anyhow::Result<()> {
        let mut balances = self.balances.borrow_mut();

        let from_balance = balances.get(from).cloned().unwrap_or_default();
        let remaining = from_balance
            .checked_sub(amount)
            .ok_or_else(|| anyhow::anyhow!("{} cannot cover {}", from, amount))?;

        balances.insert(from.clone(), remaining);
        balances.entry(to.clone()).or_default().add(amount);
        Ok(())
    }
}

/// In-memory target registry. Clones share the same targets.
#[derive(Debug, Clone, Default)]
pub struct MemRegistry {
    targets: Rc<RefCell<HashMap<(TargetKind, u32), Target>>>,
}

impl MemRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a target
    pub fn put(&self, target: Target) {
        self.targets
            .borrow_mut()
            .insert((target.kind(), target.id()), target);
    }
}

impl TargetRegistry for MemRegistry {
    fn get(&self, kind: TargetKind, id: u32) -> anyhow::Result<Option<Target>> {
        Ok(self.targets.borrow().get(&(kind, id)).cloned())
    }

    fn save(&self, target: &Target) -> anyhow::Result<()> {
        self.put(target.clone());
        Ok(())
    }

    fn all(&self) -> anyhow::Result<Vec<Target>> {
        let mut targets: Vec<Target> = self.targets.borrow().values().cloned().collect();
        targets.sort_by_key(|t| (t.kind(), t.id()));
        Ok(targets)
    }
}

/// Fixed-price oracle. Denoms without an explicit price are worth one.
#[derive(Debug, Clone, Default)]
pub struct MemOracle {
    prices: Rc<RefCell<HashMap<Denom, Decimal>>>,
}

impl MemOracle {
    /// Oracle pricing everything at one
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unit price of a denom
    pub fn set_price(&self, denom: Denom, price: Decimal) {
        self.prices.borrow_mut().insert(denom, price);
    }
}

impl PricingOracle for MemOracle {
    fn value_of(&self, coins: &Coins) -> anyhow::Result<Decimal> {
        let prices = self.prices.borrow();
        let mut total = Decimal::ZERO;
        for (denom, amount) in coins.iter() {
            let price = prices.get(denom).copied().unwrap_or(Decimal::ONE);
            total += price * Decimal::from(*amount);
        }
        Ok(total)
    }
}

/// Hook double that records every call and optionally fails one method
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    calls: Rc<RefCell<Vec<String>>>,
    fail_on: Rc<RefCell<Option<String>>>,
}

impl RecordingHooks {
    /// Recorder that never fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named method return an error from now on
    pub fn fail_on(&self, method: &str) {
        *self.fail_on.borrow_mut() = Some(method.to_string());
    }

    /// Every call recorded so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, method: &str, detail: String) -> anyhow::Result<()> {
        self.calls.borrow_mut().push(format!("{}:{}", method, detail));
        if self.fail_on.borrow().as_deref() == Some(method) {
            anyhow::bail!("{} rejected", method);
        }
        Ok(())
    }
}

impl RestakingHooks for RecordingHooks {
    fn before_delegation_created(
        &self,
        _ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        self.record(
            "before_delegation_created",
            format!("{}/{}/{}", target_kind, target_id, delegator),
        )
    }

    fn before_delegation_shares_modified(
        &self,
        _ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        self.record(
            "before_delegation_shares_modified",
            format!("{}/{}/{}", target_kind, target_id, delegator),
        )
    }

    fn after_delegation_modified(
        &self,
        _ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        self.record(
            "after_delegation_modified",
            format!("{}/{}/{}", target_kind, target_id, delegator),
        )
    }

    fn before_delegation_removed(
        &self,
        _ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        self.record(
            "before_delegation_removed",
            format!("{}/{}/{}", target_kind, target_id, delegator),
        )
    }

    fn after_unbonding_initiated(
        &self,
        _ctx: &BlockContext,
        unbonding_id: u64,
    ) -> anyhow::Result<()> {
        self.record("after_unbonding_initiated", unbonding_id.to_string())
    }
}

//! Delegation engine
//!
//! The engine owns the persistent delegation state and drives every state
//! transition: delegating, undelegating, maturing the unbonding queue and
//! genesis import/export. Delegating and undelegating stage their writes in
//! a single RocksDB batch and commit only after the last fallible step, so
//! a failed operation leaves no trace. The maturity sweep instead commits
//! each entry's removal before paying it, so a failed payout can never
//! cause a second payment.
//!
//! Token custody stays with the external ledger: delegating moves tokens
//! into the target's escrow account, and they leave it only when an
//! unbonding entry matures.

use crate::{
    config::Config,
    error::{Error, Result},
    external::{LedgerKeeper, PricingOracle, TargetRegistry},
    storage::Storage,
};
use restaking_core::{
    Address, BlockContext, Coins, DecCoins, Delegation, MultiHooks, Params, RestakingHooks,
    Target, TargetKind,
};
use rocksdb::WriteBatch;
use rust_decimal::Decimal;

/// Persistent delegation engine
pub struct Engine {
    pub(crate) storage: Storage,
    pub(crate) ledger: Box<dyn LedgerKeeper>,
    pub(crate) registry: Box<dyn TargetRegistry>,
    pub(crate) oracle: Option<Box<dyn PricingOracle>>,
    pub(crate) hooks: MultiHooks,
    pub(crate) authority: Address,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("authority", &self.authority)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Open the engine over the configured database
    pub fn open(
        config: &Config,
        ledger: Box<dyn LedgerKeeper>,
        registry: Box<dyn TargetRegistry>,
    ) -> Result<Self> {
        let storage = Storage::open(config)?;
        Ok(Self {
            storage,
            ledger,
            registry,
            oracle: None,
            hooks: MultiHooks::new(),
            authority: Address::new(config.authority.clone()),
        })
    }

    /// Attach the price source backing the restaking cap. Without one the
    /// cap is not enforced.
    pub fn set_oracle(&mut self, oracle: Box<dyn PricingOracle>) {
        self.oracle = Some(oracle);
    }

    /// Append a lifecycle hook. Hooks run in registration order.
    pub fn register_hooks(&mut self, hooks: Box<dyn RestakingHooks>) {
        self.hooks.register(hooks);
    }

    /// Look up one delegation, `None` if the delegator has never delegated
    /// to this target
    pub fn delegation(
        &self,
        kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> Result<Option<Delegation>> {
        self.storage.get_delegation(kind, target_id, delegator)
    }

    /// All delegations held by one delegator
    pub fn delegations_of(&self, delegator: &Address) -> Result<Vec<Delegation>> {
        self.storage.delegations_of(delegator)
    }

    /// All delegations against one target
    pub fn delegations_to(&self, kind: TargetKind, target_id: u32) -> Result<Vec<Delegation>> {
        self.storage.delegations_by_target(kind, target_id)
    }

    /// Look up one unbonding delegation, `None` if nothing is unbonding
    pub fn unbonding_delegation(
        &self,
        kind: TargetKind,
        delegator: &Address,
        target_id: u32,
    ) -> Result<Option<restaking_core::UnbondingDelegation>> {
        self.storage.get_unbonding(kind, delegator, target_id)
    }

    /// Current params, defaults before genesis
    pub fn params(&self) -> Result<Params> {
        Ok(self.storage.get_params()?.unwrap_or_default())
    }

    /// Replace params. Only the configured authority may call this.
    pub fn update_params(&self, authority: &Address, params: Params) -> Result<()> {
        if *authority != self.authority {
            return Err(Error::Unauthorized {
                expected: self.authority.to_string(),
                actual: authority.to_string(),
            });
        }
        params.validate()?;

        let mut batch = WriteBatch::default();
        self.storage.stage_params(&mut batch, &params)?;
        self.storage.commit(batch)?;

        tracing::info!(authority = %authority, "Params updated");
        Ok(())
    }

    /// Delegate tokens to a target.
    ///
    /// Moves `amount` from the delegator to the target's escrow account,
    /// issues shares at the target's current exchange rate and records
    /// them on the delegation. Returns the newly issued shares.
    pub fn delegate(
        &self,
        ctx: &BlockContext,
        delegator: &Address,
        kind: TargetKind,
        target_id: u32,
        amount: &Coins,
    ) -> Result<DecCoins> {
        delegator.validate().map_err(Error::Core)?;
        amount.validate().map_err(Error::Core)?;
        if amount.is_zero() {
            return Err(restaking_core::Error::InvalidShares(
                "delegation amount is empty".to_string(),
            )
            .into());
        }

        let params = self.params()?;
        for denom in amount.denoms() {
            if !params.is_denom_restakable(denom) {
                return Err(
                    restaking_core::Error::DenomNotRestakable(denom.to_string()).into(),
                );
            }
        }

        let mut target = self.lookup_target(kind, target_id)?;
        if !target.is_active() {
            return Err(restaking_core::Error::TargetNotActive {
                kind,
                id: target_id,
            }
            .into());
        }
        if target.invalid_ex_rate() {
            return Err(restaking_core::Error::InvalidExchangeRate.into());
        }

        self.check_restaking_cap(&params, amount)?;

        // Every hook runs before the transfer; a rejected delegation moves
        // no tokens and touches no collaborator
        let existing = self.storage.get_delegation(kind, target_id, delegator)?;
        if existing.is_some() {
            self.hooks
                .before_delegation_shares_modified(ctx, kind, target_id, delegator)
                .map_err(restaking_core::Error::HookRejected)?;
        } else {
            self.hooks
                .before_delegation_created(ctx, kind, target_id, delegator)
                .map_err(restaking_core::Error::HookRejected)?;
        }

        let new_shares = target.add_tokens(amount).map_err(Error::Core)?;

        let mut delegation = existing
            .unwrap_or_else(|| Delegation::new(delegator.clone(), kind, target_id));
        delegation.shares.add(&new_shares);

        let mut batch = WriteBatch::default();
        self.storage.stage_delegation(&mut batch, &delegation)?;

        self.hooks
            .after_delegation_modified(ctx, kind, target_id, delegator)
            .map_err(restaking_core::Error::HookRejected)?;

        self.ledger
            .transfer(delegator, target.address(), amount)
            .map_err(|e| Error::InsufficientFunds(e.to_string()))?;
        self.registry.save(&target).map_err(Error::Collaborator)?;
        self.storage.commit(batch)?;

        tracing::info!(
            delegator = %delegator,
            target = %format_args!("{}/{}", kind, target_id),
            %amount,
            shares = %new_shares,
            "Delegation performed"
        );

        Ok(new_shares)
    }

    /// Convert a token amount into the shares it would unbond, validating
    /// against the delegator's position.
    ///
    /// The truncated share worth of `amount` must not exceed the owned
    /// shares; the full-precision worth may round past them, in which case
    /// the result is clamped per denom so a full withdrawal never fails on
    /// rounding.
    pub fn validate_unbond_amount(
        &self,
        kind: TargetKind,
        target_id: u32,
        delegator: &Address,
        amount: &Coins,
    ) -> Result<DecCoins> {
        let target = self.lookup_target(kind, target_id)?;
        let delegation = self
            .storage
            .get_delegation(kind, target_id, delegator)?
            .ok_or(restaking_core::Error::DelegationNotFound)?;

        self.unbond_shares(&target, &delegation, amount)
    }

    pub(crate) fn unbond_shares(
        &self,
        target: &Target,
        delegation: &Delegation,
        amount: &Coins,
    ) -> Result<DecCoins> {
        let shares = target.shares_from_tokens(amount).map_err(Error::Core)?;
        let truncated = target
            .shares_from_tokens_truncated(amount)
            .map_err(Error::Core)?;

        if truncated.is_any_gt(&delegation.shares) {
            return Err(restaking_core::Error::InvalidShares(format!(
                "unbonding {} worth of shares but only {} owned",
                amount, delegation.shares
            ))
            .into());
        }

        // Full-precision worth can round a hair past the owned shares even
        // when the truncated worth fits. Clamp per denom so withdrawing the
        // whole position works.
        let mut clamped = DecCoins::new();
        for (denom, value) in shares.iter() {
            let owned = delegation.shares.amount_of(denom);
            clamped.add_amount(denom.clone(), (*value).min(owned));
        }

        Ok(clamped)
    }

    pub(crate) fn lookup_target(&self, kind: TargetKind, id: u32) -> Result<Target> {
        self.registry
            .get(kind, id)
            .map_err(Error::Collaborator)?
            .ok_or_else(|| restaking_core::Error::TargetNotFound { kind, id }.into())
    }

    fn check_restaking_cap(&self, params: &Params, amount: &Coins) -> Result<()> {
        if params.restaking_cap.is_zero() {
            return Ok(());
        }
        let Some(oracle) = &self.oracle else {
            return Ok(());
        };

        let mut total = Decimal::ZERO;
        for target in self.registry.all().map_err(Error::Collaborator)? {
            total += oracle
                .value_of(&target.tokens())
                .map_err(Error::Collaborator)?;
        }
        let added = oracle.value_of(amount).map_err(Error::Collaborator)?;

        if total + added > params.restaking_cap {
            return Err(Error::RestakingCapExceeded {
                total,
                added,
                cap: params.restaking_cap,
            });
        }

        Ok(())
    }
}

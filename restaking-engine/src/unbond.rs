//! Undelegation and the unbonding maturity queue

use crate::{
    engine::Engine,
    error::{Error, Result},
};
use chrono::{DateTime, Utc};
use restaking_core::{
    Address, BlockContext, Coins, RestakingHooks, TargetKind, UnbondingDelegation,
};
use rocksdb::WriteBatch;
use std::collections::HashSet;

/// Outcome of one undelegation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbondResponse {
    /// Instant the tokens become claimable
    pub completion_time: DateTime<Utc>,
    /// Tokens that started unbonding
    pub tokens: Coins,
    /// Identifier of the entry recording the tranche. For coalesced
    /// tranches this is the id of the entry merged into.
    pub unbonding_id: u64,
}

/// One unbonding entry that reached maturity and paid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbondingCompletion {
    /// Delegator the tokens were returned to
    pub delegator: Address,
    /// Kind of the target unbonded from
    pub target_kind: TargetKind,
    /// Identifier of the target unbonded from
    pub target_id: u32,
    /// Identifier of the matured entry
    pub unbonding_id: u64,
    /// Tokens returned
    pub amount: Coins,
}

impl Engine {
    /// Undelegate a token amount from a target.
    ///
    /// Burns the corresponding shares, removes the matching tokens from the
    /// target and parks them in an unbonding entry. The tokens stay in the
    /// target's escrow account until the entry matures. Removing the last
    /// shares deletes the delegation record.
    pub fn undelegate(
        &self,
        ctx: &BlockContext,
        delegator: &Address,
        kind: TargetKind,
        target_id: u32,
        amount: &Coins,
    ) -> Result<UnbondResponse> {
        amount.validate().map_err(Error::Core)?;
        if amount.is_zero() {
            return Err(restaking_core::Error::InvalidShares(
                "undelegation amount is empty".to_string(),
            )
            .into());
        }

        let mut target = self.lookup_target(kind, target_id)?;
        let mut delegation = self
            .storage
            .get_delegation(kind, target_id, delegator)?
            .ok_or(restaking_core::Error::DelegationNotFound)?;

        let shares = self.unbond_shares(&target, &delegation, amount)?;

        // Entry-count check comes before any side effect so a rejected
        // request leaves the registry untouched
        let params = self.params()?;
        let completion_time = ctx.time
            + chrono::Duration::from_std(params.unbonding_duration)
                .map_err(|e| Error::Config(format!("unbonding duration out of range: {}", e)))?;

        let mut ubd = self
            .storage
            .get_unbonding(kind, delegator, target_id)?
            .unwrap_or_else(|| UnbondingDelegation::new(delegator.clone(), kind, target_id));

        if ubd.entries.len() >= params.max_entries as usize
            && !ubd.can_coalesce(ctx.height, completion_time)
        {
            return Err(restaking_core::Error::MaxUnbondingEntriesExceeded.into());
        }

        self.hooks
            .before_delegation_shares_modified(ctx, kind, target_id, delegator)
            .map_err(restaking_core::Error::HookRejected)?;

        let tokens = target.remove_del_shares(&shares).map_err(Error::Core)?;

        let mut batch = WriteBatch::default();

        delegation.shares = delegation
            .shares
            .checked_sub(&shares)
            .ok_or_else(|| {
                restaking_core::Error::InvalidShares(format!(
                    "removing {} shares from a position of {}",
                    shares, delegation.shares
                ))
            })?;

        if delegation.shares.is_zero() {
            self.hooks
                .before_delegation_removed(ctx, kind, target_id, delegator)
                .map_err(restaking_core::Error::HookRejected)?;
            self.storage
                .stage_delete_delegation(&mut batch, kind, target_id, delegator)?;
        } else {
            self.storage.stage_delegation(&mut batch, &delegation)?;
            self.hooks
                .after_delegation_modified(ctx, kind, target_id, delegator)
                .map_err(restaking_core::Error::HookRejected)?;
        }

        let next_id = self.storage.get_unbonding_id()? + 1;
        let coalesced = ubd.add_entry(ctx.height, completion_time, tokens.clone(), next_id);

        let unbonding_id = if coalesced {
            // The tranche merged into an existing entry, so the fresh id
            // was never used and the queue already has the marker.
            ubd.entries
                .iter()
                .find(|e| e.creation_height == ctx.height && e.completion_time == completion_time)
                .map(|e| e.unbonding_id)
                .unwrap_or(next_id)
        } else {
            self.storage.stage_unbonding_id(&mut batch, next_id)?;
            self.storage
                .stage_queue_insert(&mut batch, completion_time, kind, target_id, delegator)?;
            next_id
        };

        self.storage.stage_unbonding(&mut batch, &ubd)?;

        // Registry write happens last so no earlier failure can leave the
        // target holding burned shares
        self.registry.save(&target).map_err(Error::Collaborator)?;
        self.storage.commit(batch)?;

        if !coalesced {
            // Failure here is surfaced but does not undo the unbonding
            if let Err(e) = self.hooks.after_unbonding_initiated(ctx, unbonding_id) {
                tracing::warn!(unbonding_id, error = %e, "after_unbonding_initiated hook failed");
            }
        }

        tracing::info!(
            delegator = %delegator,
            target = %format_args!("{}/{}", kind, target_id),
            tokens = %tokens,
            completion_time = %completion_time,
            coalesced,
            "Unbonding started"
        );

        Ok(UnbondResponse {
            completion_time,
            tokens,
            unbonding_id,
        })
    }

    /// Pay out every unbonding entry whose completion time has passed.
    ///
    /// Scans the maturity queue in key order, which is completion time
    /// first, so payouts across targets and delegators are deterministic.
    /// Each entry's removal is committed before its payout, so a payout
    /// failure aborts the sweep without any entry ever paying twice.
    /// Returns one completion record per matured entry that paid tokens.
    pub fn complete_matured_unbondings(
        &self,
        ctx: &BlockContext,
    ) -> Result<Vec<UnbondingCompletion>> {
        let keys = self.storage.matured_queue_keys(ctx.time)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut completions = Vec::new();
        // Several queue markers can point at the same unbonding delegation;
        // process each one only once.
        let mut seen: HashSet<(TargetKind, u32, Address)> = HashSet::new();

        for key in keys {
            let mut batch = WriteBatch::default();
            self.storage.stage_queue_delete(&mut batch, &key)?;

            let id = (key.kind, key.target_id, key.delegator.clone());
            if !seen.insert(id) {
                self.storage.commit(batch)?;
                continue;
            }

            let Some(mut ubd) =
                self.storage
                    .get_unbonding(key.kind, &key.delegator, key.target_id)?
            else {
                self.storage.commit(batch)?;
                continue;
            };

            let target = self.lookup_target(key.kind, key.target_id)?;

            let mut matured = Vec::new();
            let mut remaining = Vec::with_capacity(ubd.entries.len());
            for entry in ubd.entries.drain(..) {
                if !entry.is_mature(ctx.time) {
                    remaining.push(entry);
                } else if !entry.balance.is_zero() {
                    matured.push(entry);
                }
            }
            ubd.entries = remaining;

            if ubd.entries.is_empty() {
                self.storage.stage_delete_unbonding(
                    &mut batch,
                    key.kind,
                    &key.delegator,
                    key.target_id,
                )?;
            } else {
                self.storage.stage_unbonding(&mut batch, &ubd)?;
            }

            // Matured entries are removed from storage before any payout;
            // a failed transfer can never leave a paid entry in the queue
            // to be paid again on the next sweep
            self.storage.commit(batch)?;

            for entry in matured {
                self.ledger
                    .transfer(target.address(), &key.delegator, &entry.balance)
                    .map_err(Error::Collaborator)?;
                completions.push(UnbondingCompletion {
                    delegator: key.delegator.clone(),
                    target_kind: key.kind,
                    target_id: key.target_id,
                    unbonding_id: entry.unbonding_id,
                    amount: entry.balance,
                });
            }
        }

        if !completions.is_empty() {
            tracing::info!(count = completions.len(), "Matured unbondings paid out");
        }

        Ok(completions)
    }
}

//! Delegation lifecycle hooks
//!
//! External components register hooks to observe or veto delegation state
//! changes. Hooks returning an error abort the triggering operation before
//! any of its writes land, except `after_unbonding_initiated` whose failure
//! is tolerated by callers.

use crate::types::{Address, BlockContext, TargetKind};

/// Observer of delegation lifecycle events.
///
/// Every method defaults to a no-op so implementors only override what they
/// care about.
pub trait RestakingHooks {
    /// Fired before a brand-new delegation record is written
    fn before_delegation_created(
        &self,
        _ctx: &BlockContext,
        _target_kind: TargetKind,
        _target_id: u32,
        _delegator: &Address,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fired before an existing delegation's shares change
    fn before_delegation_shares_modified(
        &self,
        _ctx: &BlockContext,
        _target_kind: TargetKind,
        _target_id: u32,
        _delegator: &Address,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fired after a delegation record has been created or its shares
    /// updated
    fn after_delegation_modified(
        &self,
        _ctx: &BlockContext,
        _target_kind: TargetKind,
        _target_id: u32,
        _delegator: &Address,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fired before a delegation record is deleted because all its shares
    /// were removed
    fn before_delegation_removed(
        &self,
        _ctx: &BlockContext,
        _target_kind: TargetKind,
        _target_id: u32,
        _delegator: &Address,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fired after a fresh unbonding entry is created. Not fired for
    /// tranches that coalesce into an existing entry.
    fn after_unbonding_initiated(
        &self,
        _ctx: &BlockContext,
        _unbonding_id: u64,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Ordered composite of hooks.
///
/// Hooks run in registration order; the first error aborts the chain and
/// the remaining hooks are not called.
#[derive(Default)]
pub struct MultiHooks(Vec<Box<dyn RestakingHooks>>);

impl std::fmt::Debug for MultiHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MultiHooks").field(&self.0.len()).finish()
    }
}

impl MultiHooks {
    /// Empty composite
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a hook to the end of the chain
    pub fn register(&mut self, hook: Box<dyn RestakingHooks>) {
        self.0.push(hook);
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl RestakingHooks for MultiHooks {
    fn before_delegation_created(
        &self,
        ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        for hook in &self.0 {
            hook.before_delegation_created(ctx, target_kind, target_id, delegator)?;
        }
        Ok(())
    }

    fn before_delegation_shares_modified(
        &self,
        ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        for hook in &self.0 {
            hook.before_delegation_shares_modified(ctx, target_kind, target_id, delegator)?;
        }
        Ok(())
    }

    fn after_delegation_modified(
        &self,
        ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        for hook in &self.0 {
            hook.after_delegation_modified(ctx, target_kind, target_id, delegator)?;
        }
        Ok(())
    }

    fn before_delegation_removed(
        &self,
        ctx: &BlockContext,
        target_kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> anyhow::Result<()> {
        for hook in &self.0 {
            hook.before_delegation_removed(ctx, target_kind, target_id, delegator)?;
        }
        Ok(())
    }

    fn after_unbonding_initiated(
        &self,
        ctx: &BlockContext,
        unbonding_id: u64,
    ) -> anyhow::Result<()> {
        for hook in &self.0 {
            hook.after_unbonding_initiated(ctx, unbonding_id)?;
        }
        Ok(())
    }
}

//! Genesis import and export
//!
//! Export captures everything needed to reconstruct the delegation state;
//! import validates it, rebuilds the maturity queue from the unbonding
//! entries and restores the id counter to the highest entry id seen.

use crate::{
    engine::Engine,
    error::{Error, Result},
};
use restaking_core::{Address, Delegation, Params, TargetKind, UnbondingDelegation};
use rocksdb::WriteBatch;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Complete serializable delegation state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenesisState {
    /// Governance parameters
    pub params: Option<Params>,
    /// Every delegation
    pub delegations: Vec<Delegation>,
    /// Every unbonding delegation
    pub unbonding_delegations: Vec<UnbondingDelegation>,
}

impl GenesisState {
    /// Serialize to pretty JSON, the interchange format for snapshots
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidGenesis(format!("cannot serialize: {}", e)))
    }

    /// Parse a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidGenesis(e.to_string()))
    }

    /// Reject malformed or internally inconsistent state
    pub fn validate(&self) -> Result<()> {
        if let Some(params) = &self.params {
            params
                .validate()
                .map_err(|e| Error::InvalidGenesis(e.to_string()))?;
        }

        let mut seen: HashSet<(TargetKind, u32, Address)> = HashSet::new();
        for delegation in &self.delegations {
            delegation
                .validate()
                .map_err(|e| Error::InvalidGenesis(e.to_string()))?;
            // A delegation with no shares would have been deleted
            if delegation.shares.is_zero() {
                return Err(Error::InvalidGenesis(format!(
                    "delegation of {} to {}/{} has no shares",
                    delegation.delegator, delegation.target_kind, delegation.target_id
                )));
            }
            if !seen.insert((
                delegation.target_kind,
                delegation.target_id,
                delegation.delegator.clone(),
            )) {
                return Err(Error::InvalidGenesis(format!(
                    "duplicate delegation of {} to {}/{}",
                    delegation.delegator, delegation.target_kind, delegation.target_id
                )));
            }
        }

        let mut seen_ubd: HashSet<(TargetKind, u32, Address)> = HashSet::new();
        let mut seen_ids: HashSet<u64> = HashSet::new();
        for ubd in &self.unbonding_delegations {
            ubd.validate()
                .map_err(|e| Error::InvalidGenesis(e.to_string()))?;
            if !seen_ubd.insert((ubd.target_kind, ubd.target_id, ubd.delegator.clone())) {
                return Err(Error::InvalidGenesis(format!(
                    "duplicate unbonding delegation of {} from {}/{}",
                    ubd.delegator, ubd.target_kind, ubd.target_id
                )));
            }
            for entry in &ubd.entries {
                if !seen_ids.insert(entry.unbonding_id) {
                    return Err(Error::InvalidGenesis(format!(
                        "duplicate unbonding entry id {}",
                        entry.unbonding_id
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Engine {
    /// Snapshot the whole delegation state
    pub fn export_genesis(&self) -> Result<GenesisState> {
        Ok(GenesisState {
            params: self.storage.get_params()?,
            delegations: self.storage.all_delegations()?,
            unbonding_delegations: self.storage.all_unbondings()?,
        })
    }

    /// Load a snapshot into an empty store.
    ///
    /// The maturity queue and the unbonding id counter are derived from the
    /// entries rather than carried in the snapshot, so they can never
    /// disagree with it.
    pub fn import_genesis(&self, genesis: &GenesisState) -> Result<()> {
        genesis.validate()?;

        let mut batch = WriteBatch::default();

        if let Some(params) = &genesis.params {
            self.storage.stage_params(&mut batch, params)?;
        }

        for delegation in &genesis.delegations {
            self.storage.stage_delegation(&mut batch, delegation)?;
        }

        let mut max_id = 0u64;
        for ubd in &genesis.unbonding_delegations {
            self.storage.stage_unbonding(&mut batch, ubd)?;
            for entry in &ubd.entries {
                self.storage.stage_queue_insert(
                    &mut batch,
                    entry.completion_time,
                    ubd.target_kind,
                    ubd.target_id,
                    &ubd.delegator,
                )?;
                max_id = max_id.max(entry.unbonding_id);
            }
        }
        if max_id > 0 {
            self.storage.stage_unbonding_id(&mut batch, max_id)?;
        }

        self.storage.commit(batch)?;

        tracing::info!(
            delegations = genesis.delegations.len(),
            unbondings = genesis.unbonding_delegations.len(),
            "Genesis imported"
        );

        Ok(())
    }
}

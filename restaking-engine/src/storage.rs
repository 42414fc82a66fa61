//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `delegations` - Delegation records (key: kind || target_id || delegator)
//! - `unbonding` - Unbonding delegations (key: kind || delegator || '|' || target_id)
//! - `indices` - Delegator index (key: delegator || '|' || kind || target_id)
//! - `unbonding_queue` - Maturity queue (key: completion_nanos || kind || target_id || delegator)
//! - `meta` - Params and the unbonding id counter
//!
//! The delegation key leads with the target so all delegations of one
//! target sit in one prefix range; the delegator index covers the reverse
//! lookup. Queue keys sort by completion time first, so a forward scan
//! visits matured entries in deterministic order.

use crate::{
    error::{Error, Result},
    Config,
};
use chrono::{DateTime, TimeZone, Utc};
use restaking_core::{Address, Delegation, Params, TargetKind, UnbondingDelegation};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;

/// Column family names
const CF_DELEGATIONS: &str = "delegations";
const CF_UNBONDING: &str = "unbonding";
const CF_INDICES: &str = "indices";
const CF_UNBONDING_QUEUE: &str = "unbonding_queue";
const CF_META: &str = "meta";

/// Meta keys
const META_PARAMS: &[u8] = b"params";
const META_UNBONDING_ID: &[u8] = b"unbonding_id";

/// One key in the unbonding maturity queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKey {
    /// Instant the referenced entries become claimable
    pub completion_time: DateTime<Utc>,
    /// Target kind
    pub kind: TargetKind,
    /// Target identifier
    pub target_id: u32,
    /// Delegator account
    pub delegator: Address,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_DELEGATIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_UNBONDING, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_UNBONDING_QUEUE, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_META, Self::cf_options_records()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key encodings

    fn delegation_key(kind: TargetKind, target_id: u32, delegator: &Address) -> Vec<u8> {
        let mut key = vec![kind.as_byte()];
        key.extend_from_slice(&target_id.to_be_bytes());
        key.extend_from_slice(delegator.as_bytes());
        key
    }

    fn delegation_prefix(kind: TargetKind, target_id: u32) -> Vec<u8> {
        let mut key = vec![kind.as_byte()];
        key.extend_from_slice(&target_id.to_be_bytes());
        key
    }

    fn index_key(delegator: &Address, kind: TargetKind, target_id: u32) -> Vec<u8> {
        let mut key = delegator.as_bytes().to_vec();
        key.push(b'|'); // Separator, addresses are printable ASCII
        key.push(kind.as_byte());
        key.extend_from_slice(&target_id.to_be_bytes());
        key
    }

    fn unbonding_key(kind: TargetKind, delegator: &Address, target_id: u32) -> Vec<u8> {
        let mut key = vec![kind.as_byte()];
        key.extend_from_slice(delegator.as_bytes());
        key.push(b'|');
        key.extend_from_slice(&target_id.to_be_bytes());
        key
    }

    fn completion_nanos(time: DateTime<Utc>) -> Result<i64> {
        time.timestamp_nanos_opt()
            .ok_or_else(|| Error::Storage(format!("completion time {} out of range", time)))
    }

    fn queue_key(
        completion_time: DateTime<Utc>,
        kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> Result<Vec<u8>> {
        let nanos = Self::completion_nanos(completion_time)?;
        let mut key = nanos.to_be_bytes().to_vec();
        key.push(kind.as_byte());
        key.extend_from_slice(&target_id.to_be_bytes());
        key.extend_from_slice(delegator.as_bytes());
        Ok(key)
    }

    fn decode_queue_key(key: &[u8]) -> Result<QueueKey> {
        if key.len() < 8 + 1 + 4 + 1 {
            return Err(Error::Storage(format!(
                "malformed queue key of {} bytes",
                key.len()
            )));
        }
        let nanos = i64::from_be_bytes(key[..8].try_into().expect("sliced to 8 bytes"));
        let kind = TargetKind::from_byte(key[8])
            .ok_or_else(|| Error::Storage(format!("unknown target kind byte {}", key[8])))?;
        let target_id = u32::from_be_bytes(key[9..13].try_into().expect("sliced to 4 bytes"));
        let delegator = std::str::from_utf8(&key[13..])
            .map_err(|e| Error::Storage(format!("queue key delegator not utf8: {}", e)))?;

        Ok(QueueKey {
            completion_time: Utc.timestamp_nanos(nanos),
            kind,
            target_id,
            delegator: Address::new(delegator),
        })
    }

    // Delegation operations

    /// Get a delegation, `None` if the delegator has never delegated to
    /// this target
    pub fn get_delegation(
        &self,
        kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> Result<Option<Delegation>> {
        let cf = self.cf_handle(CF_DELEGATIONS)?;
        let key = Self::delegation_key(kind, target_id, delegator);

        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage a delegation write and its delegator index entry
    pub fn stage_delegation(&self, batch: &mut WriteBatch, delegation: &Delegation) -> Result<()> {
        let cf = self.cf_handle(CF_DELEGATIONS)?;
        let key = Self::delegation_key(
            delegation.target_kind,
            delegation.target_id,
            &delegation.delegator,
        );
        let value = bincode::serialize(delegation)?;
        batch.put_cf(cf, &key, &value);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx = Self::index_key(
            &delegation.delegator,
            delegation.target_kind,
            delegation.target_id,
        );
        batch.put_cf(cf_indices, &idx, []);

        Ok(())
    }

    /// Stage deletion of a delegation and its index entry
    pub fn stage_delete_delegation(
        &self,
        batch: &mut WriteBatch,
        kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_DELEGATIONS)?;
        batch.delete_cf(cf, Self::delegation_key(kind, target_id, delegator));

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(cf_indices, Self::index_key(delegator, kind, target_id));

        Ok(())
    }

    /// All delegations of one target, delegator order
    pub fn delegations_by_target(&self, kind: TargetKind, target_id: u32) -> Result<Vec<Delegation>> {
        let cf = self.cf_handle(CF_DELEGATIONS)?;
        let prefix = Self::delegation_prefix(kind, target_id);

        let mut delegations = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, &prefix) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            delegations.push(bincode::deserialize(&value)?);
        }

        Ok(delegations)
    }

    /// All delegations of one delegator, via the index
    pub fn delegations_of(&self, delegator: &Address) -> Result<Vec<Delegation>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let mut prefix = delegator.as_bytes().to_vec();
        prefix.push(b'|');

        let mut delegations = Vec::new();
        for item in self.db.prefix_iterator_cf(cf_indices, &prefix) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let tail = &key[prefix.len()..];
            if tail.len() != 5 {
                return Err(Error::Storage(format!(
                    "malformed delegator index key of {} bytes",
                    key.len()
                )));
            }
            let kind = TargetKind::from_byte(tail[0])
                .ok_or_else(|| Error::Storage(format!("unknown target kind byte {}", tail[0])))?;
            let target_id = u32::from_be_bytes(tail[1..5].try_into().expect("sliced to 4 bytes"));

            if let Some(delegation) = self.get_delegation(kind, target_id, delegator)? {
                delegations.push(delegation);
            }
        }

        Ok(delegations)
    }

    /// Every delegation in the store
    pub fn all_delegations(&self) -> Result<Vec<Delegation>> {
        let cf = self.cf_handle(CF_DELEGATIONS)?;

        let mut delegations = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            delegations.push(bincode::deserialize(&value)?);
        }

        Ok(delegations)
    }

    // Unbonding delegation operations

    /// Get an unbonding delegation, `None` if nothing is unbonding
    pub fn get_unbonding(
        &self,
        kind: TargetKind,
        delegator: &Address,
        target_id: u32,
    ) -> Result<Option<UnbondingDelegation>> {
        let cf = self.cf_handle(CF_UNBONDING)?;
        let key = Self::unbonding_key(kind, delegator, target_id);

        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage an unbonding delegation write
    pub fn stage_unbonding(
        &self,
        batch: &mut WriteBatch,
        ubd: &UnbondingDelegation,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_UNBONDING)?;
        let key = Self::unbonding_key(ubd.target_kind, &ubd.delegator, ubd.target_id);
        let value = bincode::serialize(ubd)?;
        batch.put_cf(cf, &key, &value);
        Ok(())
    }

    /// Stage deletion of an unbonding delegation
    pub fn stage_delete_unbonding(
        &self,
        batch: &mut WriteBatch,
        kind: TargetKind,
        delegator: &Address,
        target_id: u32,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_UNBONDING)?;
        batch.delete_cf(cf, Self::unbonding_key(kind, delegator, target_id));
        Ok(())
    }

    /// Every unbonding delegation in the store
    pub fn all_unbondings(&self) -> Result<Vec<UnbondingDelegation>> {
        let cf = self.cf_handle(CF_UNBONDING)?;

        let mut ubds = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            ubds.push(bincode::deserialize(&value)?);
        }

        Ok(ubds)
    }

    // Maturity queue operations

    /// Stage a queue marker for one (completion_time, target, delegator)
    pub fn stage_queue_insert(
        &self,
        batch: &mut WriteBatch,
        completion_time: DateTime<Utc>,
        kind: TargetKind,
        target_id: u32,
        delegator: &Address,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_UNBONDING_QUEUE)?;
        let key = Self::queue_key(completion_time, kind, target_id, delegator)?;
        batch.put_cf(cf, &key, []);
        Ok(())
    }

    /// Stage removal of a queue marker
    pub fn stage_queue_delete(&self, batch: &mut WriteBatch, key: &QueueKey) -> Result<()> {
        let cf = self.cf_handle(CF_UNBONDING_QUEUE)?;
        let raw = Self::queue_key(key.completion_time, key.kind, key.target_id, &key.delegator)?;
        batch.delete_cf(cf, &raw);
        Ok(())
    }

    /// All queue markers with completion time at or before `now`, in
    /// ascending key order
    pub fn matured_queue_keys(&self, now: DateTime<Utc>) -> Result<Vec<QueueKey>> {
        let cf = self.cf_handle(CF_UNBONDING_QUEUE)?;
        let cutoff = Self::completion_nanos(now)?;

        let mut keys = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let decoded = Self::decode_queue_key(&key)?;
            if Self::completion_nanos(decoded.completion_time)? > cutoff {
                break;
            }
            keys.push(decoded);
        }

        Ok(keys)
    }

    // Meta operations

    /// Stored params, `None` before genesis
    pub fn get_params(&self) -> Result<Option<Params>> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, META_PARAMS)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage a params write
    pub fn stage_params(&self, batch: &mut WriteBatch, params: &Params) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        let value = bincode::serialize(params)?;
        batch.put_cf(cf, META_PARAMS, &value);
        Ok(())
    }

    /// Current unbonding id counter, zero before any unbonding
    pub fn get_unbonding_id(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, META_UNBONDING_ID)? {
            Some(value) => {
                let bytes: [u8; 8] = value.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!(
                        "unbonding id counter has {} bytes, want 8",
                        value.len()
                    ))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Stage a counter write
    pub fn stage_unbonding_id(&self, batch: &mut WriteBatch, id: u64) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        batch.put_cf(cf, META_UNBONDING_ID, id.to_be_bytes());
        Ok(())
    }

    /// Atomically commit a staged batch
    pub fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restaking_core::Denom;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_delegation(delegator: &str, target_id: u32) -> Delegation {
        let mut delegation =
            Delegation::new(Address::new(delegator), TargetKind::Pool, target_id);
        delegation
            .shares
            .add_amount(Denom::new("umilk"), Decimal::from(100));
        delegation
    }

    #[test]
    fn test_delegation_roundtrip() {
        let (storage, _temp) = test_storage();
        let delegation = test_delegation("alice", 1);

        let mut batch = WriteBatch::default();
        storage.stage_delegation(&mut batch, &delegation).unwrap();
        storage.commit(batch).unwrap();

        let loaded = storage
            .get_delegation(TargetKind::Pool, 1, &Address::new("alice"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded, delegation);
    }

    #[test]
    fn test_delegations_by_target_scoped_to_prefix() {
        let (storage, _temp) = test_storage();

        let mut batch = WriteBatch::default();
        storage
            .stage_delegation(&mut batch, &test_delegation("alice", 1))
            .unwrap();
        storage
            .stage_delegation(&mut batch, &test_delegation("bob", 1))
            .unwrap();
        storage
            .stage_delegation(&mut batch, &test_delegation("carol", 2))
            .unwrap();
        storage.commit(batch).unwrap();

        let for_one = storage.delegations_by_target(TargetKind::Pool, 1).unwrap();
        assert_eq!(for_one.len(), 2);
        assert!(for_one.iter().all(|d| d.target_id == 1));
    }

    #[test]
    fn test_delegations_of_uses_index() {
        let (storage, _temp) = test_storage();

        let mut batch = WriteBatch::default();
        storage
            .stage_delegation(&mut batch, &test_delegation("alice", 1))
            .unwrap();
        storage
            .stage_delegation(&mut batch, &test_delegation("alice", 2))
            .unwrap();
        storage
            .stage_delegation(&mut batch, &test_delegation("bob", 1))
            .unwrap();
        storage.commit(batch).unwrap();

        let for_alice = storage.delegations_of(&Address::new("alice")).unwrap();
        assert_eq!(for_alice.len(), 2);
        assert!(for_alice
            .iter()
            .all(|d| d.delegator == Address::new("alice")));
    }

    #[test]
    fn test_delete_delegation_removes_index_entry() {
        let (storage, _temp) = test_storage();

        let mut batch = WriteBatch::default();
        storage
            .stage_delegation(&mut batch, &test_delegation("alice", 1))
            .unwrap();
        storage.commit(batch).unwrap();

        let mut batch = WriteBatch::default();
        storage
            .stage_delete_delegation(&mut batch, TargetKind::Pool, 1, &Address::new("alice"))
            .unwrap();
        storage.commit(batch).unwrap();

        assert!(storage
            .get_delegation(TargetKind::Pool, 1, &Address::new("alice"))
            .unwrap()
            .is_none());
        assert!(storage
            .delegations_of(&Address::new("alice"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_queue_keys_sort_by_completion_time() {
        let (storage, _temp) = test_storage();
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut batch = WriteBatch::default();
        storage
            .stage_queue_insert(&mut batch, base + chrono::Duration::hours(2), TargetKind::Pool, 1, &Address::new("alice"))
            .unwrap();
        storage
            .stage_queue_insert(&mut batch, base, TargetKind::Operator, 2, &Address::new("bob"))
            .unwrap();
        storage
            .stage_queue_insert(&mut batch, base + chrono::Duration::hours(1), TargetKind::Pool, 1, &Address::new("carol"))
            .unwrap();
        storage.commit(batch).unwrap();

        let matured = storage
            .matured_queue_keys(base + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(matured.len(), 2);
        assert_eq!(matured[0].delegator, Address::new("bob"));
        assert_eq!(matured[1].delegator, Address::new("carol"));
    }

    #[test]
    fn test_unbonding_id_counter_defaults_to_zero() {
        let (storage, _temp) = test_storage();
        assert_eq!(storage.get_unbonding_id().unwrap(), 0);

        let mut batch = WriteBatch::default();
        storage.stage_unbonding_id(&mut batch, 7).unwrap();
        storage.commit(batch).unwrap();
        assert_eq!(storage.get_unbonding_id().unwrap(), 7);
    }

    #[test]
    fn test_params_roundtrip() {
        let (storage, _temp) = test_storage();
        assert!(storage.get_params().unwrap().is_none());

        let params = Params::default();
        let mut batch = WriteBatch::default();
        storage.stage_params(&mut batch, &params).unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(storage.get_params().unwrap().unwrap(), params);
    }

    #[test]
    fn test_unbonding_roundtrip() {
        let (storage, _temp) = test_storage();

        let mut ubd = UnbondingDelegation::new(Address::new("alice"), TargetKind::Service, 3);
        ubd.add_entry(
            10,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            restaking_core::Coins::one(Denom::new("umilk"), 100),
            1,
        );

        let mut batch = WriteBatch::default();
        storage.stage_unbonding(&mut batch, &ubd).unwrap();
        storage.commit(batch).unwrap();

        let loaded = storage
            .get_unbonding(TargetKind::Service, &Address::new("alice"), 3)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, ubd);
    }
}

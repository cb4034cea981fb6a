//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `transactions` - Rental transactions (key: transaction_id)
//! - `carbon` - Carbon records (key: record_id)
//! - `trust` - Trust scores (key: user_id)
//! - `policies` - Insurance policies (key: policy_id)
//! - `claims` - Insurance claims (key: claim_id)
//! - `disputes` - Disputes (key: dispute_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! Index keys are a two-byte tag followed by raw 16-byte UUIDs, so a prefix
//! scan over `tag || parent_id` yields children in UUIDv7 (creation) order.

use crate::{
    error::{Error, Result},
    store::LedgerStore,
    types::{
        CarbonRecord, Dispute, InsuranceClaim, InsurancePolicy, Transaction, TransactionStatus,
        TrustScore,
    },
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_TRANSACTIONS: &str = "transactions";
const CF_CARBON: &str = "carbon";
const CF_TRUST: &str = "trust";
const CF_POLICIES: &str = "policies";
const CF_CLAIMS: &str = "claims";
const CF_DISPUTES: &str = "disputes";
const CF_INDICES: &str = "indices";

const ALL_CFS: [&str; 7] = [
    CF_TRANSACTIONS,
    CF_CARBON,
    CF_TRUST,
    CF_POLICIES,
    CF_CLAIMS,
    CF_DISPUTES,
    CF_INDICES,
];

/// Index tags
const IDX_TX_BORROWER: &[u8; 2] = b"tb";
const IDX_TX_OWNER: &[u8; 2] = b"to";
const IDX_CARBON_TX: &[u8; 2] = b"ct";
const IDX_CARBON_USER: &[u8; 2] = b"cu";
const IDX_POLICY_TX: &[u8; 2] = b"pt";
const IDX_CLAIM_POLICY: &[u8; 2] = b"cp";
const IDX_DISPUTE_TX: &[u8; 2] = b"dt";
const IDX_DISPUTE_REPORTER: &[u8; 2] = b"dr";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    /// Serializes check-and-insert sequences that guard uniqueness
    write_lock: Mutex<()>,
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

        let cf_descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = ALL_CFS.len(),
            "Opened rental ledger"
        );

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        if name == CF_INDICES {
            let mut block_opts = rocksdb::BlockBasedOptions::default();
            block_opts.set_bloom_filter(10.0, false);
            opts.set_block_based_table_factory(&block_opts);
        }
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Generic row helpers

    fn put_row<T: Serialize>(&self, cf_name: &str, key: &Uuid, value: &T) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.db.put_cf(cf, key.as_bytes(), bincode::serialize(value)?)?;
        Ok(())
    }

    fn batch_row<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &Uuid,
        value: &T,
    ) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        batch.put_cf(cf, key.as_bytes(), bincode::serialize(value)?);
        Ok(())
    }

    fn batch_index(&self, batch: &mut WriteBatch, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_INDICES)?;
        batch.put_cf(cf, key, value);
        Ok(())
    }

    fn find_row<T: DeserializeOwned>(&self, cf_name: &str, key: &Uuid) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_row<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        entity: &'static str,
        key: &Uuid,
    ) -> Result<T> {
        self.find_row(cf_name, key)?
            .ok_or_else(|| Error::not_found(entity, key))
    }

    /// Overwrite a row that must already exist
    fn require_row(&self, cf_name: &str, entity: &'static str, key: &Uuid) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        if self.db.get_pinned_cf(cf, key.as_bytes())?.is_none() {
            return Err(Error::not_found(entity, key));
        }
        Ok(())
    }

    fn replace_row<T: Serialize>(
        &self,
        cf_name: &str,
        entity: &'static str,
        key: &Uuid,
        value: &T,
    ) -> Result<()> {
        self.require_row(cf_name, entity, key)?;
        self.put_row(cf_name, key, value)
    }

    fn scan_rows<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    // Index helpers

    fn index_key(tag: &[u8; 2], parent: &Uuid, child: Option<&Uuid>) -> Vec<u8> {
        let mut key = Vec::with_capacity(34);
        key.extend_from_slice(tag);
        key.extend_from_slice(parent.as_bytes());
        if let Some(child) = child {
            key.extend_from_slice(child.as_bytes());
        }
        key
    }

    /// Child IDs stored under `tag || parent`
    fn index_children(&self, tag: &[u8; 2], parent: &Uuid) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key(tag, parent, None);

        let mut children = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() == prefix.len() + 16 {
                let mut child = [0u8; 16];
                child.copy_from_slice(&key[prefix.len()..]);
                children.push(Uuid::from_bytes(child));
            }
        }
        Ok(children)
    }

    fn index_value(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_INDICES)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn load_children<T: DeserializeOwned>(
        &self,
        tag: &[u8; 2],
        parent: &Uuid,
        cf_name: &str,
        entity: &'static str,
    ) -> Result<Vec<T>> {
        self.index_children(tag, parent)?
            .iter()
            .map(|id| self.get_row(cf_name, entity, id))
            .collect()
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
            total_carbon_records: self.approximate_count(CF_CARBON)?,
            total_policies: self.approximate_count(CF_POLICIES)?,
            total_disputes: self.approximate_count(CF_DISPUTES)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        Ok(self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Rental ledger closed gracefully");
        Ok(())
    }
}

impl LedgerStore for Storage {
    fn put_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_row(&mut batch, CF_TRANSACTIONS, &tx.id, tx)?;
        self.batch_index(
            &mut batch,
            &Self::index_key(IDX_TX_BORROWER, &tx.borrower_id, Some(&tx.id)),
            &[],
        )?;
        self.batch_index(
            &mut batch,
            &Self::index_key(IDX_TX_OWNER, &tx.owner_id, Some(&tx.id)),
            &[],
        )?;
        self.db.write(batch)?;

        tracing::debug!(transaction_id = %tx.id, "Transaction stored");
        Ok(())
    }

    fn update_transaction(&self, tx: &Transaction) -> Result<()> {
        self.replace_row(CF_TRANSACTIONS, "Transaction", &tx.id, tx)
    }

    fn get_transaction(&self, id: Uuid) -> Result<Transaction> {
        self.get_row(CF_TRANSACTIONS, "Transaction", &id)
    }

    fn transactions_by_borrower(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        self.load_children(IDX_TX_BORROWER, &user_id, CF_TRANSACTIONS, "Transaction")
    }

    fn transactions_by_owner(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        self.load_children(IDX_TX_OWNER, &user_id, CF_TRANSACTIONS, "Transaction")
    }

    fn count_transactions_with_status(&self, status: TransactionStatus) -> Result<u64> {
        Ok(self
            .scan_rows::<Transaction>(CF_TRANSACTIONS)?
            .iter()
            .filter(|tx| tx.status == status)
            .count() as u64)
    }

    fn insert_carbon_records(&self, transaction_id: Uuid, records: &[CarbonRecord]) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let guard_key = Self::index_key(IDX_CARBON_TX, &transaction_id, None);
        if self.index_value(&guard_key)?.is_some() {
            tracing::debug!(%transaction_id, "Carbon records already present");
            return Ok(false);
        }

        let record_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();

        let mut batch = WriteBatch::default();
        for record in records {
            self.batch_row(&mut batch, CF_CARBON, &record.id, record)?;
            self.batch_index(
                &mut batch,
                &Self::index_key(IDX_CARBON_USER, &record.user_id, Some(&record.id)),
                &[],
            )?;
        }
        self.batch_index(&mut batch, &guard_key, &bincode::serialize(&record_ids)?)?;
        self.db.write(batch)?;

        Ok(true)
    }

    fn carbon_by_transaction(&self, transaction_id: Uuid) -> Result<Vec<CarbonRecord>> {
        let guard_key = Self::index_key(IDX_CARBON_TX, &transaction_id, None);
        let Some(bytes) = self.index_value(&guard_key)? else {
            return Ok(vec![]);
        };
        let record_ids: Vec<Uuid> = bincode::deserialize(&bytes)?;
        record_ids
            .iter()
            .map(|id| self.get_row(CF_CARBON, "Carbon record", id))
            .collect()
    }

    fn carbon_by_user(&self, user_id: Uuid) -> Result<Vec<CarbonRecord>> {
        self.load_children(IDX_CARBON_USER, &user_id, CF_CARBON, "Carbon record")
    }

    fn carbon_leaderboard(&self, limit: usize) -> Result<Vec<(Uuid, Decimal)>> {
        let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
        for record in self.scan_rows::<CarbonRecord>(CF_CARBON)? {
            *totals.entry(record.user_id).or_default() += record.carbon_saved_kg;
        }

        let mut ranked: Vec<(Uuid, Decimal)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn carbon_community_total(&self) -> Result<Decimal> {
        Ok(self
            .scan_rows::<CarbonRecord>(CF_CARBON)?
            .iter()
            .map(|r| r.carbon_saved_kg)
            .sum())
    }

    fn upsert_trust_score(&self, score: &TrustScore) -> Result<()> {
        self.put_row(CF_TRUST, &score.user_id, score)
    }

    fn get_trust_score(&self, user_id: Uuid) -> Result<Option<TrustScore>> {
        self.find_row(CF_TRUST, &user_id)
    }

    fn insert_policy(&self, policy: &InsurancePolicy) -> Result<()> {
        let _guard = self.write_lock.lock();

        let tx_key = Self::index_key(IDX_POLICY_TX, &policy.transaction_id, None);
        if self.index_value(&tx_key)?.is_some() {
            return Err(Error::Conflict(format!(
                "Insurance policy already exists for transaction {}",
                policy.transaction_id
            )));
        }

        let mut batch = WriteBatch::default();
        self.batch_row(&mut batch, CF_POLICIES, &policy.id, policy)?;
        self.batch_index(&mut batch, &tx_key, policy.id.as_bytes())?;
        self.db.write(batch)?;

        Ok(())
    }

    fn get_policy(&self, id: Uuid) -> Result<InsurancePolicy> {
        self.get_row(CF_POLICIES, "Insurance policy", &id)
    }

    fn policy_by_transaction(&self, transaction_id: Uuid) -> Result<Option<InsurancePolicy>> {
        let tx_key = Self::index_key(IDX_POLICY_TX, &transaction_id, None);
        match self.index_value(&tx_key)? {
            Some(bytes) => {
                let policy_id = Uuid::from_slice(&bytes)
                    .map_err(|e| Error::Storage(format!("Corrupt policy index: {}", e)))?;
                Ok(Some(self.get_policy(policy_id)?))
            }
            None => Ok(None),
        }
    }

    fn update_policy(&self, policy: &InsurancePolicy) -> Result<()> {
        self.replace_row(CF_POLICIES, "Insurance policy", &policy.id, policy)
    }

    fn insert_claim(&self, claim: &InsuranceClaim, policy: &InsurancePolicy) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.require_row(CF_POLICIES, "Insurance policy", &policy.id)?;

        let mut batch = WriteBatch::default();
        self.batch_row(&mut batch, CF_CLAIMS, &claim.id, claim)?;
        self.batch_row(&mut batch, CF_POLICIES, &policy.id, policy)?;
        self.batch_index(
            &mut batch,
            &Self::index_key(IDX_CLAIM_POLICY, &claim.policy_id, Some(&claim.id)),
            &[],
        )?;
        self.db.write(batch)?;
        Ok(())
    }

    fn get_claim(&self, id: Uuid) -> Result<InsuranceClaim> {
        self.get_row(CF_CLAIMS, "Insurance claim", &id)
    }

    fn claims_by_policy(&self, policy_id: Uuid) -> Result<Vec<InsuranceClaim>> {
        self.load_children(IDX_CLAIM_POLICY, &policy_id, CF_CLAIMS, "Insurance claim")
    }

    fn update_claim(&self, claim: &InsuranceClaim) -> Result<()> {
        self.replace_row(CF_CLAIMS, "Insurance claim", &claim.id, claim)
    }

    fn insert_dispute(&self, dispute: &Dispute, transaction: &Transaction) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.require_row(CF_TRANSACTIONS, "Transaction", &transaction.id)?;

        let existing: Vec<Dispute> =
            self.load_children(IDX_DISPUTE_TX, &dispute.transaction_id, CF_DISPUTES, "Dispute")?;
        if existing.iter().any(|d| d.status.is_open()) {
            return Err(Error::Conflict(format!(
                "An open dispute already exists for transaction {}",
                dispute.transaction_id
            )));
        }

        let mut batch = WriteBatch::default();
        self.batch_row(&mut batch, CF_DISPUTES, &dispute.id, dispute)?;
        self.batch_row(&mut batch, CF_TRANSACTIONS, &transaction.id, transaction)?;
        self.batch_index(
            &mut batch,
            &Self::index_key(IDX_DISPUTE_TX, &dispute.transaction_id, Some(&dispute.id)),
            &[],
        )?;
        self.batch_index(
            &mut batch,
            &Self::index_key(IDX_DISPUTE_REPORTER, &dispute.reporter_id, Some(&dispute.id)),
            &[],
        )?;
        self.db.write(batch)?;

        Ok(())
    }

    fn get_dispute(&self, id: Uuid) -> Result<Dispute> {
        self.get_row(CF_DISPUTES, "Dispute", &id)
    }

    fn disputes_by_transaction(&self, transaction_id: Uuid) -> Result<Vec<Dispute>> {
        self.load_children(IDX_DISPUTE_TX, &transaction_id, CF_DISPUTES, "Dispute")
    }

    fn disputes_by_reporter(&self, reporter_id: Uuid) -> Result<Vec<Dispute>> {
        self.load_children(IDX_DISPUTE_REPORTER, &reporter_id, CF_DISPUTES, "Dispute")
    }

    fn update_dispute(&self, dispute: &Dispute) -> Result<()> {
        self.replace_row(CF_DISPUTES, "Dispute", &dispute.id, dispute)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate transaction count
    pub total_transactions: u64,
    /// Approximate carbon record count
    pub total_carbon_records: u64,
    /// Approximate policy count
    pub total_policies: u64,
    /// Approximate dispute count
    pub total_disputes: u64,
}

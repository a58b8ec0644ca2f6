//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: account_number)
//! - `transactions` - Posting rows (key: transaction_id)
//! - `journals` - Journal rows (key: journal_id)
//! - `currencies` - Currency rows (key: code)
//! - `indices` - Secondary indices; every value is the primary key it points to
//!
//! # Index keys
//!
//! ```text
//! r \0 target_journal_id                               -> reversing journal_id
//! t \0 time(journaling) journal_id                     -> journal_id
//! j \0 journal_id \0 time(created) transaction_id      -> transaction_id
//! a \0 account \0 time(trx) time(created) transaction_id -> transaction_id
//! ```
//!
//! `time` is 12 bytes: seconds with the sign bit flipped, then subsecond nanos,
//! both big-endian, so byte order equals chronological order.
//!
//! All writes go through one writer mutex, and a unit of work holds it until it
//! commits or is dropped, so balance read-modify-writes never interleave.

use super::{
    page_of, AccountRecord, AccountStore, CommitMode, CurrencyRecord, CurrencyStore, JournalRecord,
    JournalStore, TransactionRecord, TransactionStore, UnitOfWork, UnitOfWorkSource,
};
use crate::{
    error::{Error, Result},
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, WriteOptions, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_JOURNALS: &str = "journals";
const CF_CURRENCIES: &str = "currencies";
const CF_INDICES: &str = "indices";

const TIME_LEN: usize = 12;

/// RocksDB ledger store
pub struct RocksStore {
    db: DB,
    writer: Mutex<()>,
    commit_mode: CommitMode,
    sync_writes: bool,
}

impl fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .field("commit_mode", &self.commit_mode)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.storage.data_dir;
        let tuning = &config.storage.rocksdb;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(tuning.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(tuning.max_write_buffer_number);
        db_opts.set_target_file_size_base(tuning.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(tuning.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            tuning.level0_file_num_compaction_trigger,
        );
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if tuning.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_JOURNALS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_CURRENCIES, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB ledger store");

        Ok(Self {
            db,
            writer: Mutex::new(()),
            commit_mode: config
                .journal
                .commit_mode_override
                .unwrap_or(CommitMode::Atomic),
            sync_writes: tuning.sync_writes,
        })
    }

    /// Advertise a different commit strategy
    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Balances are read on every posting
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

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get_row<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn has_row(&self, cf_name: &str, key: &str) -> Result<bool> {
        let cf = self.cf_handle(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key.as_bytes())?.is_some())
    }

    fn all_rows<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    /// Index values whose key starts with `prefix`, scanning from `start`, until
    /// `keep` rejects a key.
    fn scan_index(
        &self,
        prefix: &[u8],
        start: &[u8],
        keep: impl Fn(&[u8]) -> bool,
    ) -> Result<Vec<String>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(start, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) || !keep(&key[..]) {
                break;
            }
            values.push(String::from_utf8_lossy(&value).into_owned());
        }
        Ok(values)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }

    // Batch staging (rows plus their indices)

    fn stage_row<T: Serialize>(&self, batch: &mut WriteBatch, cf_name: &str, key: &str, row: &T) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        batch.put_cf(cf, key.as_bytes(), bincode::serialize(row)?);
        Ok(())
    }

    fn stage_journal(&self, batch: &mut WriteBatch, record: &JournalRecord) -> Result<()> {
        self.stage_row(batch, CF_JOURNALS, &record.journal_id, record)?;

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let id = record.journal_id.as_bytes();
        batch.put_cf(cf_indices, journal_time_key(record.journaling_time, &record.journal_id), id);
        if let Some(target) = &record.reversed_journal_id {
            batch.put_cf(cf_indices, reversal_key(target), id);
        }
        Ok(())
    }

    /// A target keeps its first reversal; the `r` index entry is never replaced
    fn ensure_not_reversed(&self, target_id: &str) -> Result<()> {
        let cf = self.cf_handle(CF_INDICES)?;
        if self.db.get_pinned_cf(cf, reversal_key(target_id))?.is_some() {
            return Err(Error::DoubleReversal(target_id.to_string()));
        }
        Ok(())
    }

    fn stage_transaction(&self, batch: &mut WriteBatch, record: &TransactionRecord) -> Result<()> {
        self.stage_row(batch, CF_TRANSACTIONS, &record.transaction_id, record)?;

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let id = record.transaction_id.as_bytes();
        batch.put_cf(cf_indices, journal_posting_key(record), id);
        batch.put_cf(cf_indices, account_posting_key(record), id);
        Ok(())
    }

    fn insert_new(
        &self,
        cf_name: &str,
        entity: &str,
        key: &str,
        stage: impl FnOnce(&Self, &mut WriteBatch) -> Result<()>,
    ) -> Result<()> {
        let _writer = self.writer.lock();
        if self.has_row(cf_name, key)? {
            return Err(Error::Storage(format!("duplicate {} key: {}", entity, key)));
        }
        let mut batch = WriteBatch::default();
        stage(self, &mut batch)?;
        self.write(batch)
    }

    fn overwrite<T: Serialize>(&self, cf_name: &str, key: &str, row: &T, missing: Error) -> Result<()> {
        let _writer = self.writer.lock();
        if !self.has_row(cf_name, key)? {
            return Err(missing);
        }
        let mut batch = WriteBatch::default();
        self.stage_row(&mut batch, cf_name, key, row)?;
        self.write(batch)
    }

    fn accounts_sorted(&self, filter: impl Fn(&AccountRecord) -> bool) -> Result<Vec<AccountRecord>> {
        let mut rows: Vec<AccountRecord> = self
            .all_rows::<AccountRecord>(CF_ACCOUNTS)?
            .into_iter()
            .filter(|a| filter(a))
            .collect();
        rows.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.account_number.cmp(&b.account_number))
        });
        Ok(rows)
    }

    fn account_posting_ids(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let prefix = index_prefix(b'a', account_number);
        let mut start = prefix.clone();
        start.extend_from_slice(&encode_time(from));
        let until = encode_time(until);
        let time_at = prefix.len();

        self.scan_index(&prefix, &start, |key| {
            key.get(time_at..time_at + TIME_LEN)
                .map_or(false, |t| t <= &until[..])
        })
    }

    fn journal_ids_in_range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<String>> {
        let prefix = [b't', 0u8];
        let mut start = prefix.to_vec();
        start.extend_from_slice(&encode_time(from));
        let until = encode_time(until);

        self.scan_index(&prefix, &start, |key| {
            key.get(2..2 + TIME_LEN).map_or(false, |t| t <= &until[..])
        })
    }

    fn transactions_by_id(&self, ids: Vec<String>) -> Result<Vec<TransactionRecord>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_row(CF_TRANSACTIONS, &id)? {
                Some(row) => rows.push(row),
                None => return Err(Error::Storage(format!("dangling transaction index: {}", id))),
            }
        }
        Ok(rows)
    }

    fn journals_by_id(&self, ids: Vec<String>) -> Result<Vec<JournalRecord>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_row(CF_JOURNALS, &id)? {
                Some(row) => rows.push(row),
                None => return Err(Error::Storage(format!("dangling journal index: {}", id))),
            }
        }
        Ok(rows)
    }
}

// Index key helpers

fn encode_time(t: DateTime<Utc>) -> [u8; TIME_LEN] {
    let mut out = [0u8; TIME_LEN];
    let secs = (t.timestamp() as u64) ^ (1 << 63);
    out[..8].copy_from_slice(&secs.to_be_bytes());
    out[8..].copy_from_slice(&t.timestamp_subsec_nanos().to_be_bytes());
    out
}

fn index_prefix(tag: u8, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(id.len() + 3);
    key.push(tag);
    key.push(0);
    key.extend_from_slice(id.as_bytes());
    key.push(0);
    key
}

fn reversal_key(target: &str) -> Vec<u8> {
    let mut key = vec![b'r', 0];
    key.extend_from_slice(target.as_bytes());
    key
}

fn journal_time_key(time: DateTime<Utc>, journal_id: &str) -> Vec<u8> {
    let mut key = vec![b't', 0];
    key.extend_from_slice(&encode_time(time));
    key.extend_from_slice(journal_id.as_bytes());
    key
}

fn journal_posting_key(record: &TransactionRecord) -> Vec<u8> {
    let mut key = index_prefix(b'j', &record.journal_id);
    key.extend_from_slice(&encode_time(record.created_at));
    key.extend_from_slice(record.transaction_id.as_bytes());
    key
}

fn account_posting_key(record: &TransactionRecord) -> Vec<u8> {
    let mut key = index_prefix(b'a', &record.account_number);
    key.extend_from_slice(&encode_time(record.transaction_time));
    key.extend_from_slice(&encode_time(record.created_at));
    key.extend_from_slice(record.transaction_id.as_bytes());
    key
}

fn name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}

impl AccountStore for RocksStore {
    fn get_account(&self, account_number: &str) -> Result<Option<AccountRecord>> {
        self.get_row(CF_ACCOUNTS, account_number)
    }

    fn insert_account(&self, record: &AccountRecord) -> Result<()> {
        self.insert_new(CF_ACCOUNTS, "account", &record.account_number, |store, batch| {
            store.stage_row(batch, CF_ACCOUNTS, &record.account_number, record)
        })
    }

    fn update_account(&self, record: &AccountRecord) -> Result<()> {
        self.overwrite(
            CF_ACCOUNTS,
            &record.account_number,
            record,
            Error::AccountNotFound(record.account_number.clone()),
        )
    }

    fn count_accounts(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn list_accounts(&self, offset: u64, limit: u64) -> Result<Vec<AccountRecord>> {
        Ok(page_of(self.accounts_sorted(|_| true)?.into_iter(), offset, limit))
    }

    fn count_accounts_by_coa(&self, coa_prefix: &str) -> Result<u64> {
        Ok(self.accounts_sorted(|a| a.coa.starts_with(coa_prefix))?.len() as u64)
    }

    fn list_accounts_by_coa(&self, coa_prefix: &str, offset: u64, limit: u64) -> Result<Vec<AccountRecord>> {
        let rows = self.accounts_sorted(|a| a.coa.starts_with(coa_prefix))?;
        Ok(page_of(rows.into_iter(), offset, limit))
    }

    fn count_accounts_by_name(&self, name_like: &str) -> Result<u64> {
        Ok(self.accounts_sorted(|a| name_matches(&a.name, name_like))?.len() as u64)
    }

    fn find_accounts_by_name(&self, name_like: &str, offset: u64, limit: u64) -> Result<Vec<AccountRecord>> {
        let rows = self.accounts_sorted(|a| name_matches(&a.name, name_like))?;
        Ok(page_of(rows.into_iter(), offset, limit))
    }
}

impl TransactionStore for RocksStore {
    fn get_transaction(&self, transaction_id: &str) -> Result<Option<TransactionRecord>> {
        self.get_row(CF_TRANSACTIONS, transaction_id)
    }

    fn insert_transaction(&self, record: &TransactionRecord) -> Result<()> {
        self.insert_new(CF_TRANSACTIONS, "transaction", &record.transaction_id, |store, batch| {
            store.stage_transaction(batch, record)
        })
    }

    fn count_transactions_by_account(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self.account_posting_ids(account_number, from, until)?.len() as u64)
    }

    fn list_transactions_by_account(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionRecord>> {
        let ids = self.account_posting_ids(account_number, from, until)?;
        self.transactions_by_id(page_of(ids.into_iter(), offset, limit))
    }

    fn list_transactions_by_journal(&self, journal_id: &str) -> Result<Vec<TransactionRecord>> {
        let prefix = index_prefix(b'j', journal_id);
        let ids = self.scan_index(&prefix, &prefix, |_| true)?;
        self.transactions_by_id(ids)
    }
}

impl JournalStore for RocksStore {
    fn get_journal(&self, journal_id: &str) -> Result<Option<JournalRecord>> {
        self.get_row(CF_JOURNALS, journal_id)
    }

    fn get_journal_by_reversal_target(&self, target_id: &str) -> Result<Option<JournalRecord>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, reversal_key(target_id))? {
            Some(id) => self.get_journal(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn insert_journal(&self, record: &JournalRecord) -> Result<()> {
        self.insert_new(CF_JOURNALS, "journal", &record.journal_id, |store, batch| {
            if let Some(target) = &record.reversed_journal_id {
                store.ensure_not_reversed(target)?;
            }
            store.stage_journal(batch, record)
        })
    }

    fn count_journals_by_time_range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<u64> {
        Ok(self.journal_ids_in_range(from, until)?.len() as u64)
    }

    fn list_journals_by_time_range(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<JournalRecord>> {
        let ids = self.journal_ids_in_range(from, until)?;
        self.journals_by_id(page_of(ids.into_iter(), offset, limit))
    }
}

impl CurrencyStore for RocksStore {
    fn get_currency(&self, code: &str) -> Result<Option<CurrencyRecord>> {
        self.get_row(CF_CURRENCIES, code)
    }

    fn insert_currency(&self, record: &CurrencyRecord) -> Result<()> {
        self.insert_new(CF_CURRENCIES, "currency", &record.code, |store, batch| {
            store.stage_row(batch, CF_CURRENCIES, &record.code, record)
        })
    }

    fn update_currency(&self, record: &CurrencyRecord) -> Result<()> {
        self.overwrite(
            CF_CURRENCIES,
            &record.code,
            record,
            Error::CurrencyNotFound(record.code.clone()),
        )
    }
}

impl UnitOfWorkSource for RocksStore {
    fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        Ok(Box::new(RocksUnitOfWork {
            store: self,
            _writer: self.writer.lock(),
            batch: WriteBatch::default(),
            journals: HashSet::new(),
            reversed: HashSet::new(),
            transactions: HashSet::new(),
            accounts: HashMap::new(),
        }))
    }
}

/// Writes accumulated in one `WriteBatch` under the writer lock
struct RocksUnitOfWork<'a> {
    store: &'a RocksStore,
    _writer: MutexGuard<'a, ()>,
    batch: WriteBatch,
    journals: HashSet<String>,
    reversed: HashSet<String>,
    transactions: HashSet<String>,
    accounts: HashMap<String, AccountRecord>,
}

impl UnitOfWork for RocksUnitOfWork<'_> {
    fn get_account(&mut self, account_number: &str) -> Result<Option<AccountRecord>> {
        if let Some(staged) = self.accounts.get(account_number) {
            return Ok(Some(staged.clone()));
        }
        self.store.get_account(account_number)
    }

    fn insert_journal(&mut self, record: JournalRecord) -> Result<()> {
        if self.journals.contains(&record.journal_id)
            || self.store.has_row(CF_JOURNALS, &record.journal_id)?
        {
            return Err(Error::Storage(format!("duplicate journal key: {}", record.journal_id)));
        }
        if let Some(target) = &record.reversed_journal_id {
            if self.reversed.contains(target) {
                return Err(Error::DoubleReversal(target.clone()));
            }
            self.store.ensure_not_reversed(target)?;
        }
        self.store.stage_journal(&mut self.batch, &record)?;
        if let Some(target) = &record.reversed_journal_id {
            self.reversed.insert(target.clone());
        }
        self.journals.insert(record.journal_id);
        Ok(())
    }

    fn insert_transaction(&mut self, record: TransactionRecord) -> Result<()> {
        if self.transactions.contains(&record.transaction_id)
            || self.store.has_row(CF_TRANSACTIONS, &record.transaction_id)?
        {
            return Err(Error::Storage(format!(
                "duplicate transaction key: {}",
                record.transaction_id
            )));
        }
        self.store.stage_transaction(&mut self.batch, &record)?;
        self.transactions.insert(record.transaction_id);
        Ok(())
    }

    fn update_account(&mut self, record: AccountRecord) -> Result<()> {
        if !self.accounts.contains_key(&record.account_number)
            && !self.store.has_row(CF_ACCOUNTS, &record.account_number)?
        {
            return Err(Error::AccountNotFound(record.account_number));
        }
        self.store
            .stage_row(&mut self.batch, CF_ACCOUNTS, &record.account_number, &record)?;
        self.accounts.insert(record.account_number.clone(), record);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let RocksUnitOfWork { store, batch, .. } = *self;
        let writes = batch.len();
        store.write(batch)?;
        tracing::debug!(writes, "RocksDB unit of work committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        tracing::debug!(writes = self.batch.len(), "RocksDB unit of work discarded");
        Ok(())
    }
}

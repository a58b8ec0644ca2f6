//! Storage boundary
//!
//! The ledger never talks to a database directly. It consumes a set of narrow
//! capability traits, one per entity, plus a unit-of-work source that makes the
//! write phase of a journal indivisible.
//!
//! # Backends
//!
//! - [`InMemoryStore`] - process-local, serializable units of work (default, tests)
//! - `RocksStore` - RocksDB column families with `WriteBatch` commits (feature `rocksdb`)
//!
//! # Isolation
//!
//! Posting a journal reads each account balance and writes it back. Backends must
//! make that read-modify-write safe against concurrent units of work touching the
//! same account; both bundled backends serialize units of work.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod record;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use memory::InMemoryStore;
pub use record::{AccountRecord, CurrencyRecord, JournalRecord, TransactionRecord};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

/// Account rows. Listings are ordered by name.
pub trait AccountStore: Send + Sync {
    /// Get account by number
    fn get_account(&self, account_number: &str) -> Result<Option<AccountRecord>>;

    /// Insert a new account; fails if the number is taken
    fn insert_account(&self, record: &AccountRecord) -> Result<()>;

    /// Overwrite an existing account
    fn update_account(&self, record: &AccountRecord) -> Result<()>;

    /// Count all accounts
    fn count_accounts(&self) -> Result<u64>;

    /// List all accounts
    fn list_accounts(&self, offset: u64, limit: u64) -> Result<Vec<AccountRecord>>;

    /// Count accounts whose COA starts with `coa_prefix`
    fn count_accounts_by_coa(&self, coa_prefix: &str) -> Result<u64>;

    /// List accounts whose COA starts with `coa_prefix`
    fn list_accounts_by_coa(&self, coa_prefix: &str, offset: u64, limit: u64) -> Result<Vec<AccountRecord>>;

    /// Count accounts whose name contains `name_like` (case-insensitive)
    fn count_accounts_by_name(&self, name_like: &str) -> Result<u64>;

    /// List accounts whose name contains `name_like` (case-insensitive)
    fn find_accounts_by_name(&self, name_like: &str, offset: u64, limit: u64) -> Result<Vec<AccountRecord>>;
}

/// Posting rows
pub trait TransactionStore: Send + Sync {
    /// Get posting by ID
    fn get_transaction(&self, transaction_id: &str) -> Result<Option<TransactionRecord>>;

    /// Insert a posting; fails if the ID is taken
    fn insert_transaction(&self, record: &TransactionRecord) -> Result<()>;

    /// Count postings on `account_number` with `from <= transaction_time <= until`
    fn count_transactions_by_account(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64>;

    /// List postings on `account_number` in the range, ordered by transaction time
    fn list_transactions_by_account(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionRecord>>;

    /// All postings of a journal
    fn list_transactions_by_journal(&self, journal_id: &str) -> Result<Vec<TransactionRecord>>;
}

/// Journal rows
pub trait JournalStore: Send + Sync {
    /// Get journal by ID
    fn get_journal(&self, journal_id: &str) -> Result<Option<JournalRecord>>;

    /// Get the journal that declares `target_id` as its reversal target
    fn get_journal_by_reversal_target(&self, target_id: &str) -> Result<Option<JournalRecord>>;

    /// Insert a journal; fails if the ID is taken, or with `DoubleReversal`
    /// if its reversal target already has a reversal
    fn insert_journal(&self, record: &JournalRecord) -> Result<()>;

    /// Count journals with `from <= journaling_time <= until`
    fn count_journals_by_time_range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<u64>;

    /// List journals in the range, ordered by journaling time
    fn list_journals_by_time_range(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<JournalRecord>>;
}

/// Currency rows
pub trait CurrencyStore: Send + Sync {
    /// Get currency by code
    fn get_currency(&self, code: &str) -> Result<Option<CurrencyRecord>>;

    /// Insert a currency; fails if the code is taken
    fn insert_currency(&self, record: &CurrencyRecord) -> Result<()>;

    /// Overwrite an existing currency
    fn update_currency(&self, record: &CurrencyRecord) -> Result<()>;
}

/// How a backend finalizes the write phase of a journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Writes commit inside `persist_journal`; commit/cancel hooks are no-ops
    Atomic,
    /// `persist_journal` only validates and stages; `commit_journal` writes,
    /// `cancel_journal` discards
    Deferred,
}

/// All writes of one journal persistence. Reads observe the staged writes.
///
/// Dropping a unit of work without committing discards it.
pub trait UnitOfWork {
    /// Account as seen by this unit of work
    fn get_account(&mut self, account_number: &str) -> Result<Option<AccountRecord>>;

    /// Stage a journal insert. A reversal whose target is already reversed,
    /// committed or staged here, fails with `DoubleReversal`.
    fn insert_journal(&mut self, record: JournalRecord) -> Result<()>;

    /// Stage a posting insert
    fn insert_transaction(&mut self, record: TransactionRecord) -> Result<()>;

    /// Stage an account overwrite
    fn update_account(&mut self, record: AccountRecord) -> Result<()>;

    /// Make every staged write visible, or none
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every staged write
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens units of work and advertises the commit strategy
pub trait UnitOfWorkSource: Send + Sync {
    /// Commit strategy of this backend
    fn commit_mode(&self) -> CommitMode {
        CommitMode::Atomic
    }

    /// Begin a unit of work
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;
}

/// Everything the journal ledger needs from a backend
pub trait LedgerStore:
    AccountStore + TransactionStore + JournalStore + CurrencyStore + UnitOfWorkSource
{
}

impl<S> LedgerStore for S where
    S: AccountStore + TransactionStore + JournalStore + CurrencyStore + UnitOfWorkSource
{
}

fn in_range(t: DateTime<Utc>, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    from <= t && t <= until
}

fn page_of<T>(items: impl Iterator<Item = T>, offset: u64, limit: u64) -> Vec<T> {
    items
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect()
}

//! Wallet Ledger
//!
//! Double-entry bookkeeping core: accounts, balanced journals of postings,
//! reversals and a currency exchange rate table.
//!
//! # Architecture
//!
//! - **Capability traits**: the ledger consumes narrow per-entity store traits
//! - **Unit of work**: the write phase of a journal is all-or-nothing
//! - **Commit modes**: atomic, or staged until an explicit commit
//! - **Backends**: in-memory (default) and RocksDB (feature `rocksdb`)
//!
//! # Invariants
//!
//! - Balance: Σ(debit amounts) == Σ(credit amounts) for every journal
//! - Running balances: each posting records the account balance it produced
//! - Immutability: journals and postings are never modified or deleted
//! - Reversal: a journal is reversed at most once

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod page;
pub mod storage;
pub mod account;
pub mod exchange;
pub mod transaction;
pub mod journal;
pub mod projection;
pub mod ledger;
pub mod error;
pub mod config;
pub mod metrics;
pub mod api;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    Account, Alignment, Currency, Journal, NewJournal, NewTransaction, Transaction,
};
pub use page::{Page, PageRequest, PageResult};
pub use storage::{CommitMode, InMemoryStore, LedgerStore};
pub use account::AccountRegistry;
pub use exchange::ExchangeRateTable;
pub use transaction::TransactionIndex;
pub use journal::JournalLedger;
pub use projection::{AccountStatement, JournalSheet};
pub use ledger::Ledger;
pub use config::{Backend, Config};
pub use metrics::Metrics;

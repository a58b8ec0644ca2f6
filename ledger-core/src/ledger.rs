//! Main ledger orchestration layer
//!
//! This module wires one storage backend to the account registry, exchange rate
//! table, journal ledger and transaction index.
//!
//! # Example
//!
//! ```no_run
//! use wallet_ledger::{Alignment, Config, Ledger, NewJournal, NewTransaction};
//!
//! fn main() -> wallet_ledger::Result<()> {
//!     let ledger = Ledger::in_memory(Config::default())?;
//!     ledger.exchange().set_exchange_value_of("USD", 1.0, "ops")?;
//!
//!     for (number, side) in [("1001", Alignment::Debit), ("2001", Alignment::Credit)] {
//!         let account = ledger
//!             .accounts()
//!             .new_account(number)
//!             .name(number)
//!             .description("wallet")
//!             .currency("USD")
//!             .alignment(side)
//!             .created_by("ops")
//!             .build();
//!         ledger.accounts().persist_account(&account)?;
//!     }
//!
//!     let journal = NewJournal::new("J-1", "ops")
//!         .posting(NewTransaction::debit("T-1", "1001", 100))
//!         .posting(NewTransaction::credit("T-2", "2001", 100));
//!     ledger.journals().persist_journal(&journal)?;
//!     Ok(())
//! }
//! ```

use crate::{
    account::AccountRegistry,
    exchange::ExchangeRateTable,
    journal::JournalLedger,
    metrics::Metrics,
    page::PageRequest,
    projection::AccountStatement,
    storage::{InMemoryStore, LedgerStore},
    transaction::TransactionIndex,
    types::{generate_id, NewJournal},
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger<S> {
    /// Shared backend
    store: Arc<S>,

    accounts: AccountRegistry<S>,
    exchange: ExchangeRateTable<S>,
    journals: JournalLedger<S>,
    transactions: TransactionIndex<S>,

    metrics: Arc<Metrics>,

    /// Configuration
    config: Config,
}

impl Ledger<InMemoryStore> {
    /// Ledger over a fresh in-memory store
    pub fn in_memory(config: Config) -> Result<Self> {
        let store = match config.journal.commit_mode_override {
            Some(mode) => InMemoryStore::with_commit_mode(mode),
            None => InMemoryStore::new(),
        };
        Self::with_store(Arc::new(store), config)
    }
}

#[cfg(feature = "rocksdb")]
impl Ledger<crate::storage::RocksStore> {
    /// Open a RocksDB-backed ledger under `config.storage.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let store = crate::storage::RocksStore::open(&config)?;
        Self::with_store(Arc::new(store), config)
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Ledger over an existing store
    pub fn with_store(store: Arc<S>, config: Config) -> Result<Self> {
        let metrics = Arc::new(
            Metrics::new().map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?,
        );

        let exchange =
            ExchangeRateTable::with_denominator(store.clone(), config.exchange.common_denominator)?;

        let mut journals = JournalLedger::new(store.clone())
            .with_max_reversal_depth(config.journal.max_reversal_depth)
            .with_metrics(metrics.clone());
        if let Some(mode) = config.journal.commit_mode_override {
            journals = journals.with_commit_mode(mode);
        }

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            commit_mode = ?journals.commit_mode(),
            common_denominator = config.exchange.common_denominator,
            "Ledger ready"
        );

        Ok(Self {
            accounts: AccountRegistry::new(store.clone()),
            transactions: TransactionIndex::new(store.clone()),
            exchange,
            journals,
            store,
            metrics,
            config,
        })
    }

    /// Account registry
    pub fn accounts(&self) -> &AccountRegistry<S> {
        &self.accounts
    }

    /// Exchange rate table
    pub fn exchange(&self) -> &ExchangeRateTable<S> {
        &self.exchange
    }

    /// Journal ledger
    pub fn journals(&self) -> &JournalLedger<S> {
        &self.journals
    }

    /// Transaction index
    pub fn transactions(&self) -> &TransactionIndex<S> {
        &self.transactions
    }

    /// Backend
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persist the reversal of `journal_id` under a generated journal ID.
    ///
    /// Returns the new journal ID. In deferred mode the reversal is only staged.
    pub fn reverse_journal(&self, journal_id: &str, author: &str) -> Result<String> {
        let original = self.journals.get_journal_by_id(journal_id)?;
        let reversal_id = generate_id();
        let candidate = NewJournal::reversal_of(&original, reversal_id.clone(), author, |_| generate_id());
        self.journals.persist_journal(&candidate)?;
        Ok(reversal_id)
    }

    /// One page of an account's posting history
    pub fn account_statement(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        request: PageRequest,
    ) -> Result<AccountStatement> {
        let account = self.accounts.get_account_by_id(account_number)?;
        let page = self
            .transactions
            .list_transactions_on_account(from, until, account_number, request)?;
        Ok(AccountStatement::new(&account, from, until, page.result, &page.items))
    }
}

//! Journal ledger
//!
//! Validates candidate journals and writes them, with their postings and the
//! resulting account balances, in one unit of work.
//!
//! # Validation order
//!
//! A candidate is rejected on the first failing check, before anything is written:
//!
//! 1. journal ID, postings and author are present
//! 2. journal ID is not persisted
//! 3. every posting has an ID and a non-negative amount
//! 4. no posting ID is persisted or repeated
//! 5. debit total equals credit total
//! 6. no account is posted twice
//! 7. every account exists
//! 8. every account uses the same currency
//! 9. a reversal target exists and is not reversed yet
//!
//! # Commit strategy
//!
//! With [`CommitMode::Atomic`] the write phase runs inside `persist_journal` and
//! `commit_journal`/`cancel_journal` do nothing. With [`CommitMode::Deferred`]
//! `persist_journal` only validates and stages; `commit_journal` re-validates and
//! writes, `cancel_journal` drops the staged journal.

use crate::{
    metrics::Metrics,
    page::{Page, PageRequest, PageResult},
    projection::JournalSheet,
    storage::{
        AccountRecord, CommitMode, JournalRecord, LedgerStore, TransactionRecord, UnitOfWork,
    },
    types::{apply_posting, Alignment, Journal, NewJournal, Transaction},
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

/// Default bound on reversal links followed by [`JournalLedger::get_journal_by_id`]
pub const DEFAULT_MAX_REVERSAL_DEPTH: usize = 64;

/// Journal ledger over a full ledger store
#[derive(Debug)]
pub struct JournalLedger<S> {
    store: Arc<S>,
    commit_mode: CommitMode,
    max_reversal_depth: usize,
    staged: Mutex<HashMap<String, NewJournal>>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: LedgerStore> JournalLedger<S> {
    /// Create ledger using the commit strategy advertised by the store
    pub fn new(store: Arc<S>) -> Self {
        let commit_mode = store.commit_mode();
        Self {
            store,
            commit_mode,
            max_reversal_depth: DEFAULT_MAX_REVERSAL_DEPTH,
            staged: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Override the commit strategy
    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    /// Bound the reversal links followed when hydrating a journal
    pub fn with_max_reversal_depth(mut self, depth: usize) -> Self {
        self.max_reversal_depth = depth;
        self
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Active commit strategy
    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// Empty journal candidate
    pub fn new_journal(&self, journal_id: impl Into<String>, author: impl Into<String>) -> NewJournal {
        NewJournal::new(journal_id, author)
    }

    /// Validate a candidate and persist it (atomic mode) or stage it (deferred mode)
    pub fn persist_journal(&self, candidate: &NewJournal) -> Result<()> {
        let started = Instant::now();

        if let Err(e) = self.validate(candidate) {
            tracing::error!(
                journal_id = %candidate.journal_id,
                reason = e.kind(),
                error = %e,
                "Journal rejected"
            );
            self.record_rejection(&e);
            return Err(e);
        }

        let outcome = match self.commit_mode {
            CommitMode::Atomic => self.write(candidate),
            CommitMode::Deferred => self.stage(candidate),
        };
        self.record_duration(started);
        outcome
    }

    /// Run the write phase of a staged journal. No-op in atomic mode.
    pub fn commit_journal(&self, journal_id: &str) -> Result<()> {
        if self.commit_mode == CommitMode::Atomic {
            tracing::debug!(journal_id = %journal_id, "Commit is a no-op in atomic mode");
            return Ok(());
        }

        let started = Instant::now();
        let candidate = self.unstage(journal_id)?;

        if let Err(e) = self.validate(&candidate) {
            tracing::error!(
                journal_id = %journal_id,
                reason = e.kind(),
                error = %e,
                "Staged journal no longer valid; dropped"
            );
            self.record_rejection(&e);
            return Err(e);
        }

        let outcome = self.write(&candidate);
        self.record_duration(started);
        outcome
    }

    /// Discard a staged journal. No-op in atomic mode.
    pub fn cancel_journal(&self, journal_id: &str) -> Result<()> {
        if self.commit_mode == CommitMode::Atomic {
            tracing::debug!(journal_id = %journal_id, "Cancel is a no-op in atomic mode");
            return Ok(());
        }
        self.unstage(journal_id)?;
        tracing::info!(journal_id = %journal_id, "Staged journal cancelled");
        Ok(())
    }

    /// IDs of journals awaiting commit, sorted
    pub fn staged_journals(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.staged.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether some persisted journal reverses `journal_id`
    pub fn is_journal_id_reversed(&self, journal_id: &str) -> Result<bool> {
        Ok(self.store.get_journal_by_reversal_target(journal_id)?.is_some())
    }

    /// Whether a journal with this ID is persisted
    pub fn is_journal_id_exist(&self, journal_id: &str) -> Result<bool> {
        Ok(self.store.get_journal(journal_id)?.is_some())
    }

    /// Load a journal with its postings and, for a reversal, the full chain of
    /// reversed journals.
    pub fn get_journal_by_id(&self, journal_id: &str) -> Result<Journal> {
        let head = self
            .store
            .get_journal(journal_id)?
            .ok_or_else(|| Error::JournalNotFound(journal_id.to_string()))?;

        let mut visited = HashSet::new();
        visited.insert(head.journal_id.clone());
        let mut chain = vec![head];

        loop {
            let (current_id, target) = match chain.last() {
                Some(current) if current.is_reversal => {
                    (current.journal_id.clone(), current.reversed_journal_id.clone())
                }
                _ => break,
            };
            let broken = || Error::InconsistentReversalChain(current_id.clone());

            let target = target.ok_or_else(broken)?;
            if chain.len() > self.max_reversal_depth || !visited.insert(target.clone()) {
                tracing::error!(
                    journal_id = %journal_id,
                    at = %current_id,
                    target = %target,
                    "Reversal chain is cyclic or too deep"
                );
                return Err(broken());
            }

            match self.store.get_journal(&target)? {
                Some(next) => chain.push(next),
                None => {
                    tracing::error!(
                        journal_id = %journal_id,
                        target = %target,
                        "Reversed journal is missing"
                    );
                    return Err(broken());
                }
            }
        }

        let mut hydrated: Option<Journal> = None;
        while let Some(record) = chain.pop() {
            let transactions = self
                .store
                .list_transactions_by_journal(&record.journal_id)?
                .into_iter()
                .map(Transaction::from)
                .collect();
            hydrated = Some(Journal {
                journal_id: record.journal_id,
                journaling_time: record.journaling_time,
                description: record.description,
                is_reversal: record.is_reversal,
                reversed_journal_id: record.reversed_journal_id,
                reversed_journal: hydrated.map(Box::new),
                amount: record.total_amount,
                created_at: record.created_at,
                created_by: record.created_by,
                transactions,
            });
        }

        tracing::debug!(journal_id = %journal_id, "Journal loaded");
        hydrated.ok_or_else(|| Error::JournalNotFound(journal_id.to_string()))
    }

    /// Journals recorded within `[from, until]`, ordered by journaling time.
    ///
    /// A journal that cannot be hydrated is logged and left out of the page.
    pub fn list_journals(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        request: PageRequest,
    ) -> Result<Page<Journal>> {
        let total = self.store.count_journals_by_time_range(from, until)?;
        let result = PageResult::for_request(request, total);
        let records = self
            .store
            .list_journals_by_time_range(from, until, result.offset, result.page_size)?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match self.get_journal_by_id(&record.journal_id) {
                Ok(journal) => items.push(journal),
                Err(e) => tracing::warn!(
                    journal_id = %record.journal_id,
                    error = %e,
                    "Skipping journal that failed to load"
                ),
            }
        }
        Ok(Page { result, items })
    }

    /// Load a journal and split its postings by side
    pub fn journal_sheet(&self, journal_id: &str) -> Result<JournalSheet> {
        Ok(JournalSheet::from(&self.get_journal_by_id(journal_id)?))
    }

    fn validate(&self, candidate: &NewJournal) -> Result<()> {
        let journal_id = &candidate.journal_id;

        // 1
        if journal_id.is_empty() {
            return Err(Error::JournalMissingId);
        }
        if candidate.transactions.is_empty() {
            return Err(Error::JournalNoTransactions(journal_id.clone()));
        }
        if candidate.created_by.is_empty() {
            return Err(Error::JournalMissingAuthor(journal_id.clone()));
        }

        // 2
        if self.store.get_journal(journal_id)?.is_some() {
            return Err(Error::JournalAlreadyPersisted(journal_id.clone()));
        }

        // 3
        for (index, trx) in candidate.transactions.iter().enumerate() {
            if trx.transaction_id.is_empty() {
                return Err(Error::TransactionMissingId {
                    journal_id: journal_id.clone(),
                    index,
                });
            }
            if trx.amount < 0 {
                return Err(Error::NegativeAmount(trx.transaction_id.clone()));
            }
        }

        // 4
        let mut seen_ids = HashSet::new();
        for trx in &candidate.transactions {
            if !seen_ids.insert(trx.transaction_id.as_str())
                || self.store.get_transaction(&trx.transaction_id)?.is_some()
            {
                return Err(Error::TransactionAlreadyPersisted(trx.transaction_id.clone()));
            }
        }

        // 5
        let (debit, credit) = side_totals(candidate);
        if debit != credit {
            return Err(Error::NotBalanced { debit, credit });
        }
        if i64::try_from(credit).is_err() {
            return Err(Error::AmountOverflow(format!("total of journal {}", journal_id)));
        }

        // 6
        let mut seen_accounts = HashSet::new();
        for trx in &candidate.transactions {
            if !seen_accounts.insert(trx.account_number.as_str()) {
                return Err(Error::DuplicateAccountInJournal(trx.account_number.clone()));
            }
        }

        // 7
        let mut accounts = Vec::with_capacity(candidate.transactions.len());
        for trx in &candidate.transactions {
            match self.store.get_account(&trx.account_number)? {
                Some(account) => accounts.push(account),
                None => return Err(Error::AccountNotPersisted(trx.account_number.clone())),
            }
        }

        // 8
        if let Some((first, rest)) = accounts.split_first() {
            if let Some(other) = rest.iter().find(|a| a.currency_code != first.currency_code) {
                return Err(Error::CurrencyMismatch {
                    expected: first.currency_code.clone(),
                    found: other.currency_code.clone(),
                });
            }
        }

        // 9
        if let Some(target) = &candidate.reversed_journal_id {
            if self.store.get_journal(target)?.is_none() {
                return Err(Error::JournalNotFound(target.clone()));
            }
            if self.is_journal_id_reversed(target)? {
                return Err(Error::DoubleReversal(target.clone()));
            }
            let staged = self.staged.lock();
            if staged.values().any(|other| {
                other.journal_id != *journal_id
                    && other.reversed_journal_id.as_deref() == Some(target.as_str())
            }) {
                return Err(Error::DoubleReversal(target.clone()));
            }
        }

        Ok(())
    }

    fn stage(&self, candidate: &NewJournal) -> Result<()> {
        let staged_count = {
            let mut staged = self.staged.lock();
            if staged.contains_key(&candidate.journal_id) {
                drop(staged);
                let e = Error::JournalAlreadyPersisted(candidate.journal_id.clone());
                tracing::error!(journal_id = %candidate.journal_id, "Journal is already staged");
                self.record_rejection(&e);
                return Err(e);
            }
            staged.insert(candidate.journal_id.clone(), candidate.clone());
            staged.len()
        };

        if let Some(metrics) = &self.metrics {
            metrics.update_staged(staged_count);
        }
        tracing::info!(journal_id = %candidate.journal_id, "Journal staged for commit");
        Ok(())
    }

    fn unstage(&self, journal_id: &str) -> Result<NewJournal> {
        let (candidate, staged_count) = {
            let mut staged = self.staged.lock();
            let candidate = staged.remove(journal_id);
            (candidate, staged.len())
        };
        if let Some(metrics) = &self.metrics {
            metrics.update_staged(staged_count);
        }
        candidate.ok_or_else(|| Error::JournalNotStaged(journal_id.to_string()))
    }

    fn write(&self, candidate: &NewJournal) -> Result<()> {
        let journal_id = &candidate.journal_id;
        let mut uow = self.store.begin()?;

        if let Err(e) = apply_journal(&mut *uow, candidate) {
            tracing::error!(
                journal_id = %journal_id,
                error = %e,
                "Journal write failed; rolling back"
            );
            if let Err(rollback_err) = uow.rollback() {
                tracing::error!(journal_id = %journal_id, error = %rollback_err, "Rollback failed");
            }
            self.record_rejection(&e);
            return Err(e);
        }

        if let Err(e) = uow.commit() {
            tracing::error!(journal_id = %journal_id, error = %e, "Journal commit failed");
            self.record_rejection(&e);
            return Err(e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_journal_persisted(candidate.transactions.len());
        }
        tracing::info!(
            journal_id = %journal_id,
            transactions = candidate.transactions.len(),
            reversal_of = ?candidate.reversed_journal_id,
            "Journal persisted"
        );
        Ok(())
    }

    fn record_rejection(&self, e: &Error) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(e.kind());
        }
    }

    fn record_duration(&self, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_persist_duration(started.elapsed().as_secs_f64());
        }
    }
}

fn side_totals(candidate: &NewJournal) -> (i128, i128) {
    candidate
        .transactions
        .iter()
        .fold((0i128, 0i128), |(debit, credit), trx| match trx.alignment {
            Alignment::Debit => (debit + i128::from(trx.amount), credit),
            Alignment::Credit => (debit, credit + i128::from(trx.amount)),
        })
}

fn apply_journal<U: UnitOfWork + ?Sized>(uow: &mut U, candidate: &NewJournal) -> Result<()> {
    let now = Utc::now();
    let (_, credit) = side_totals(candidate);
    let total_amount = i64::try_from(credit)
        .map_err(|_| Error::AmountOverflow(format!("total of journal {}", candidate.journal_id)))?;

    uow.insert_journal(JournalRecord {
        journal_id: candidate.journal_id.clone(),
        journaling_time: now,
        description: candidate.description.clone(),
        is_reversal: candidate.reversed_journal_id.is_some(),
        reversed_journal_id: candidate.reversed_journal_id.clone(),
        total_amount,
        created_at: now,
        created_by: candidate.created_by.clone(),
    })?;

    for trx in &candidate.transactions {
        let account = uow
            .get_account(&trx.account_number)?
            .ok_or_else(|| Error::AccountNotPersisted(trx.account_number.clone()))?;

        let balance = apply_posting(account.balance, account.normal_side(), trx.alignment, trx.amount)
            .ok_or_else(|| Error::AmountOverflow(format!("balance of account {}", account.account_number)))?;

        let created_by = if trx.created_by.is_empty() {
            candidate.created_by.clone()
        } else {
            trx.created_by.clone()
        };
        uow.insert_transaction(TransactionRecord {
            transaction_id: trx.transaction_id.clone(),
            transaction_time: trx.transaction_time,
            account_number: trx.account_number.clone(),
            journal_id: candidate.journal_id.clone(),
            description: trx.description.clone(),
            alignment: trx.alignment.as_marker().to_string(),
            amount: trx.amount,
            balance,
            created_at: now,
            created_by,
        })?;

        tracing::debug!(
            journal_id = %candidate.journal_id,
            account = %account.account_number,
            from = account.balance,
            to = balance,
            "Account balance moved"
        );
        uow.update_account(AccountRecord {
            balance,
            updated_at: now,
            updated_by: candidate.created_by.clone(),
            ..account
        })?;
    }

    Ok(())
}

//! In-memory backend
//!
//! A unit of work holds the state write lock for its whole lifetime, so units of
//! work are serialized and readers only ever see committed state.

use super::{
    in_range, page_of, AccountRecord, AccountStore, CommitMode, CurrencyRecord, CurrencyStore,
    JournalRecord, JournalStore, TransactionRecord, TransactionStore, UnitOfWork, UnitOfWorkSource,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<String, AccountRecord>,
    transactions: BTreeMap<String, TransactionRecord>,
    journals: BTreeMap<String, JournalRecord>,
    currencies: BTreeMap<String, CurrencyRecord>,
}

impl State {
    fn accounts_by_name(&self, filter: impl Fn(&AccountRecord) -> bool) -> Vec<&AccountRecord> {
        let mut matched: Vec<&AccountRecord> = self.accounts.values().filter(|a| filter(*a)).collect();
        matched.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.account_number.cmp(&b.account_number))
        });
        matched
    }

    fn account_transactions(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<&TransactionRecord> {
        let mut matched: Vec<&TransactionRecord> = self
            .transactions
            .values()
            .filter(|t| t.account_number == account_number && in_range(t.transaction_time, from, until))
            .collect();
        matched.sort_by(|a, b| {
            a.transaction_time
                .cmp(&b.transaction_time)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        matched
    }

    fn is_reversed(&self, target_id: &str) -> bool {
        self.journals
            .values()
            .any(|j| j.reversed_journal_id.as_deref() == Some(target_id))
    }

    fn journals_in_range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<&JournalRecord> {
        let mut matched: Vec<&JournalRecord> = self
            .journals
            .values()
            .filter(|j| in_range(j.journaling_time, from, until))
            .collect();
        matched.sort_by(|a, b| {
            a.journaling_time
                .cmp(&b.journaling_time)
                .then_with(|| a.journal_id.cmp(&b.journal_id))
        });
        matched
    }
}

fn name_matches(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}

fn reversal_target(record: &JournalRecord) -> Option<&str> {
    record.reversed_journal_id.as_deref()
}

fn duplicate(entity: &str, key: &str) -> Error {
    Error::Storage(format!("duplicate {} key: {}", entity, key))
}

/// In-memory ledger store
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    commit_mode: CommitMode,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store with atomic commits
    pub fn new() -> Self {
        Self::with_commit_mode(CommitMode::Atomic)
    }

    /// Empty store advertising the given commit strategy
    pub fn with_commit_mode(commit_mode: CommitMode) -> Self {
        Self {
            state: RwLock::new(State::default()),
            commit_mode,
        }
    }
}

impl AccountStore for InMemoryStore {
    fn get_account(&self, account_number: &str) -> Result<Option<AccountRecord>> {
        Ok(self.state.read().accounts.get(account_number).cloned())
    }

    fn insert_account(&self, record: &AccountRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.accounts.contains_key(&record.account_number) {
            return Err(duplicate("account", &record.account_number));
        }
        state
            .accounts
            .insert(record.account_number.clone(), record.clone());
        Ok(())
    }

    fn update_account(&self, record: &AccountRecord) -> Result<()> {
        let mut state = self.state.write();
        match state.accounts.get_mut(&record.account_number) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::AccountNotFound(record.account_number.clone())),
        }
    }

    fn count_accounts(&self) -> Result<u64> {
        Ok(self.state.read().accounts.len() as u64)
    }

    fn list_accounts(&self, offset: u64, limit: u64) -> Result<Vec<AccountRecord>> {
        let state = self.state.read();
        let sorted = state.accounts_by_name(|_| true);
        Ok(page_of(sorted.into_iter().cloned(), offset, limit))
    }

    fn count_accounts_by_coa(&self, coa_prefix: &str) -> Result<u64> {
        let state = self.state.read();
        Ok(state
            .accounts
            .values()
            .filter(|a| a.coa.starts_with(coa_prefix))
            .count() as u64)
    }

    fn list_accounts_by_coa(&self, coa_prefix: &str, offset: u64, limit: u64) -> Result<Vec<AccountRecord>> {
        let state = self.state.read();
        let sorted = state.accounts_by_name(|a| a.coa.starts_with(coa_prefix));
        Ok(page_of(sorted.into_iter().cloned(), offset, limit))
    }

    fn count_accounts_by_name(&self, name_like: &str) -> Result<u64> {
        let state = self.state.read();
        Ok(state
            .accounts
            .values()
            .filter(|a| name_matches(&a.name, name_like))
            .count() as u64)
    }

    fn find_accounts_by_name(&self, name_like: &str, offset: u64, limit: u64) -> Result<Vec<AccountRecord>> {
        let state = self.state.read();
        let sorted = state.accounts_by_name(|a| name_matches(&a.name, name_like));
        Ok(page_of(sorted.into_iter().cloned(), offset, limit))
    }
}

impl TransactionStore for InMemoryStore {
    fn get_transaction(&self, transaction_id: &str) -> Result<Option<TransactionRecord>> {
        Ok(self.state.read().transactions.get(transaction_id).cloned())
    }

    fn insert_transaction(&self, record: &TransactionRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.transactions.contains_key(&record.transaction_id) {
            return Err(duplicate("transaction", &record.transaction_id));
        }
        state
            .transactions
            .insert(record.transaction_id.clone(), record.clone());
        Ok(())
    }

    fn count_transactions_by_account(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<u64> {
        let state = self.state.read();
        Ok(state.account_transactions(account_number, from, until).len() as u64)
    }

    fn list_transactions_by_account(
        &self,
        account_number: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read();
        let sorted = state.account_transactions(account_number, from, until);
        Ok(page_of(sorted.into_iter().cloned(), offset, limit))
    }

    fn list_transactions_by_journal(&self, journal_id: &str) -> Result<Vec<TransactionRecord>> {
        let state = self.state.read();
        let mut matched: Vec<TransactionRecord> = state
            .transactions
            .values()
            .filter(|t| t.journal_id == journal_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(matched)
    }
}

impl JournalStore for InMemoryStore {
    fn get_journal(&self, journal_id: &str) -> Result<Option<JournalRecord>> {
        Ok(self.state.read().journals.get(journal_id).cloned())
    }

    fn get_journal_by_reversal_target(&self, target_id: &str) -> Result<Option<JournalRecord>> {
        let state = self.state.read();
        Ok(state
            .journals
            .values()
            .find(|j| j.reversed_journal_id.as_deref() == Some(target_id))
            .cloned())
    }

    fn insert_journal(&self, record: &JournalRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.journals.contains_key(&record.journal_id) {
            return Err(duplicate("journal", &record.journal_id));
        }
        if let Some(target) = reversal_target(record) {
            if state.is_reversed(target) {
                return Err(Error::DoubleReversal(target.to_string()));
            }
        }
        state.journals.insert(record.journal_id.clone(), record.clone());
        Ok(())
    }

    fn count_journals_by_time_range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Result<u64> {
        Ok(self.state.read().journals_in_range(from, until).len() as u64)
    }

    fn list_journals_by_time_range(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<JournalRecord>> {
        let state = self.state.read();
        let sorted = state.journals_in_range(from, until);
        Ok(page_of(sorted.into_iter().cloned(), offset, limit))
    }
}

impl CurrencyStore for InMemoryStore {
    fn get_currency(&self, code: &str) -> Result<Option<CurrencyRecord>> {
        Ok(self.state.read().currencies.get(code).cloned())
    }

    fn insert_currency(&self, record: &CurrencyRecord) -> Result<()> {
        let mut state = self.state.write();
        if state.currencies.contains_key(&record.code) {
            return Err(duplicate("currency", &record.code));
        }
        state.currencies.insert(record.code.clone(), record.clone());
        Ok(())
    }

    fn update_currency(&self, record: &CurrencyRecord) -> Result<()> {
        let mut state = self.state.write();
        match state.currencies.get_mut(&record.code) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::CurrencyNotFound(record.code.clone())),
        }
    }
}

impl UnitOfWorkSource for InMemoryStore {
    fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        Ok(Box::new(MemoryUnitOfWork {
            state: self.state.write(),
            journals: Vec::new(),
            transactions: Vec::new(),
            accounts: BTreeMap::new(),
        }))
    }
}

/// Staged writes over the locked state
struct MemoryUnitOfWork<'a> {
    state: RwLockWriteGuard<'a, State>,
    journals: Vec<JournalRecord>,
    transactions: Vec<TransactionRecord>,
    accounts: BTreeMap<String, AccountRecord>,
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn get_account(&mut self, account_number: &str) -> Result<Option<AccountRecord>> {
        if let Some(staged) = self.accounts.get(account_number) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.state.accounts.get(account_number).cloned())
    }

    fn insert_journal(&mut self, record: JournalRecord) -> Result<()> {
        if self.state.journals.contains_key(&record.journal_id)
            || self.journals.iter().any(|j| j.journal_id == record.journal_id)
        {
            return Err(duplicate("journal", &record.journal_id));
        }
        if let Some(target) = reversal_target(&record) {
            if self.state.is_reversed(target)
                || self.journals.iter().any(|j| reversal_target(j) == Some(target))
            {
                return Err(Error::DoubleReversal(target.to_string()));
            }
        }
        self.journals.push(record);
        Ok(())
    }

    fn insert_transaction(&mut self, record: TransactionRecord) -> Result<()> {
        if self.state.transactions.contains_key(&record.transaction_id)
            || self
                .transactions
                .iter()
                .any(|t| t.transaction_id == record.transaction_id)
        {
            return Err(duplicate("transaction", &record.transaction_id));
        }
        self.transactions.push(record);
        Ok(())
    }

    fn update_account(&mut self, record: AccountRecord) -> Result<()> {
        if !self.state.accounts.contains_key(&record.account_number) {
            return Err(Error::AccountNotFound(record.account_number));
        }
        self.accounts.insert(record.account_number.clone(), record);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            mut state,
            journals,
            transactions,
            accounts,
        } = *self;

        for journal in journals {
            state.journals.insert(journal.journal_id.clone(), journal);
        }
        for trx in transactions {
            state.transactions.insert(trx.transaction_id.clone(), trx);
        }
        for (number, account) in accounts {
            state.accounts.insert(number, account);
        }

        tracing::trace!("In-memory unit of work committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        tracing::trace!("In-memory unit of work rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(number: &str, name: &str, coa: &str) -> AccountRecord {
        AccountRecord {
            account_number: number.to_string(),
            name: name.to_string(),
            currency_code: "USD".to_string(),
            description: "test".to_string(),
            alignment: "DEBIT".to_string(),
            balance: 0,
            coa: coa.to_string(),
            created_at: Utc::now(),
            created_by: "tester".to_string(),
            updated_at: Utc::now(),
            updated_by: "tester".to_string(),
        }
    }

    fn journal(id: &str) -> JournalRecord {
        JournalRecord {
            journal_id: id.to_string(),
            journaling_time: Utc::now(),
            description: "test".to_string(),
            is_reversal: false,
            reversed_journal_id: None,
            total_amount: 0,
            created_at: Utc::now(),
            created_by: "tester".to_string(),
        }
    }

    #[test]
    fn test_duplicate_account_insert_fails() {
        let store = InMemoryStore::new();
        store.insert_account(&account("1", "Cash", "100")).unwrap();
        assert!(matches!(
            store.insert_account(&account("1", "Cash", "100")),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_listing_filters_and_orders_by_name() {
        let store = InMemoryStore::new();
        store.insert_account(&account("3", "Revenue", "400")).unwrap();
        store.insert_account(&account("1", "Petty Cash", "110")).unwrap();
        store.insert_account(&account("2", "Cash at Bank", "120")).unwrap();

        let all = store.list_accounts(0, 10).unwrap();
        let names: Vec<_> = all.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Cash at Bank", "Petty Cash", "Revenue"]);

        assert_eq!(store.count_accounts_by_coa("1").unwrap(), 2);
        assert_eq!(store.count_accounts_by_name("CASH").unwrap(), 2);
        let found = store.find_accounts_by_name("cash", 1, 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Petty Cash");
    }

    #[test]
    fn test_unit_of_work_reads_its_own_writes() {
        let store = InMemoryStore::new();
        store.insert_account(&account("1", "Cash", "100")).unwrap();

        let mut uow = store.begin().unwrap();
        let mut rec = uow.get_account("1").unwrap().unwrap();
        rec.balance = 42;
        uow.update_account(rec).unwrap();
        assert_eq!(uow.get_account("1").unwrap().unwrap().balance, 42);
        uow.commit().unwrap();

        assert_eq!(store.get_account("1").unwrap().unwrap().balance, 42);
    }

    #[test]
    fn test_rollback_and_drop_discard_writes() {
        let store = InMemoryStore::new();

        let mut uow = store.begin().unwrap();
        uow.insert_journal(journal("J1")).unwrap();
        uow.rollback().unwrap();
        assert!(store.get_journal("J1").unwrap().is_none());

        {
            let mut uow = store.begin().unwrap();
            uow.insert_journal(journal("J2")).unwrap();
        }
        assert!(store.get_journal("J2").unwrap().is_none());
    }

    #[test]
    fn test_unit_of_work_rejects_duplicate_journal() {
        let store = InMemoryStore::new();
        store.insert_journal(&journal("J1")).unwrap();

        let mut uow = store.begin().unwrap();
        assert!(uow.insert_journal(journal("J1")).is_err());
    }

    #[test]
    fn test_reversal_target_lookup() {
        let store = InMemoryStore::new();
        store.insert_journal(&journal("J1")).unwrap();
        let mut reversal = journal("R1");
        reversal.is_reversal = true;
        reversal.reversed_journal_id = Some("J1".to_string());
        store.insert_journal(&reversal).unwrap();

        let found = store.get_journal_by_reversal_target("J1").unwrap().unwrap();
        assert_eq!(found.journal_id, "R1");
        assert!(store.get_journal_by_reversal_target("R1").unwrap().is_none());
    }

    #[test]
    fn test_second_reversal_of_a_target_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_journal(&journal("J1")).unwrap();
        let reversal = |id: &str| JournalRecord {
            is_reversal: true,
            reversed_journal_id: Some("J1".to_string()),
            ..journal(id)
        };

        let mut uow = store.begin().unwrap();
        uow.insert_journal(reversal("R1")).unwrap();
        assert!(matches!(
            uow.insert_journal(reversal("R2")),
            Err(Error::DoubleReversal(target)) if target == "J1"
        ));
        uow.commit().unwrap();

        let mut uow = store.begin().unwrap();
        assert!(matches!(
            uow.insert_journal(reversal("R3")),
            Err(Error::DoubleReversal(_))
        ));
        drop(uow);
        assert!(matches!(
            store.insert_journal(&reversal("R4")),
            Err(Error::DoubleReversal(_))
        ));
        assert_eq!(
            store.get_journal_by_reversal_target("J1").unwrap().unwrap().journal_id,
            "R1"
        );
    }
}

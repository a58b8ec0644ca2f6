//! Transaction index
//!
//! Read-side view over persisted postings. Postings are only written by the
//! journal ledger.

use crate::{
    page::{Page, PageRequest, PageResult},
    storage::TransactionStore,
    types::Transaction,
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Posting lookups over a transaction store
#[derive(Debug)]
pub struct TransactionIndex<S> {
    store: Arc<S>,
}

impl<S> Clone for TransactionIndex<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: TransactionStore> TransactionIndex<S> {
    /// Create index
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Whether a posting with this ID is persisted
    pub fn is_transaction_id_exist(&self, transaction_id: &str) -> Result<bool> {
        Ok(self.store.get_transaction(transaction_id)?.is_some())
    }

    /// Load one posting
    pub fn get_transaction_by_id(&self, transaction_id: &str) -> Result<Transaction> {
        self.store
            .get_transaction(transaction_id)?
            .map(Transaction::from)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_string()))
    }

    /// Postings on `account_number` with `from <= transaction_time <= until`,
    /// ordered by transaction time
    pub fn list_transactions_on_account(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        account_number: &str,
        request: PageRequest,
    ) -> Result<Page<Transaction>> {
        let total = self
            .store
            .count_transactions_by_account(account_number, from, until)?;
        let result = PageResult::for_request(request, total);
        let rows = self.store.list_transactions_by_account(
            account_number,
            from,
            until,
            result.offset,
            result.page_size,
        )?;

        tracing::debug!(
            account = %account_number,
            total,
            page = result.page,
            "Listed account transactions"
        );
        Ok(Page {
            result,
            items: rows.into_iter().map(Transaction::from).collect(),
        })
    }

    /// All postings of one journal
    pub fn list_transactions_on_journal(&self, journal_id: &str) -> Result<Vec<Transaction>> {
        Ok(self
            .store
            .list_transactions_by_journal(journal_id)?
            .into_iter()
            .map(Transaction::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::{InMemoryStore, TransactionRecord}, types::Alignment};
    use chrono::Duration;

    fn posting(id: &str, account: &str, at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            transaction_id: id.to_string(),
            transaction_time: at,
            account_number: account.to_string(),
            journal_id: "J1".to_string(),
            description: String::new(),
            alignment: "debit".to_string(),
            amount: 10,
            balance: 10,
            created_at: at,
            created_by: "tester".to_string(),
        }
    }

    #[test]
    fn test_lookup() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_transaction(&posting("T1", "A1", Utc::now())).unwrap();
        let index = TransactionIndex::new(store);

        assert!(index.is_transaction_id_exist("T1").unwrap());
        assert!(!index.is_transaction_id_exist("T2").unwrap());
        assert_eq!(index.get_transaction_by_id("T1").unwrap().alignment, Alignment::Debit);
        assert!(matches!(
            index.get_transaction_by_id("T2"),
            Err(Error::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let store = Arc::new(InMemoryStore::new());
        let base = Utc::now();
        for i in 0..5 {
            store
                .insert_transaction(&posting(&format!("T{}", i), "A1", base + Duration::minutes(i)))
                .unwrap();
        }
        store.insert_transaction(&posting("X", "A2", base)).unwrap();
        let index = TransactionIndex::new(store);

        let page = index
            .list_transactions_on_account(
                base + Duration::minutes(1),
                base + Duration::minutes(3),
                "A1",
                PageRequest::new(1, 10),
            )
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2", "T3"]);
        assert_eq!(page.result.total_entries, 3);
        assert_eq!(index.list_transactions_on_journal("J1").unwrap().len(), 6);
    }
}

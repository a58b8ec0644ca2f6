//! Read-side projections
//!
//! Serializable views for rendering journals and account histories. They carry
//! no invariants of their own.

#![allow(missing_docs)]

use crate::{
    page::PageResult,
    types::{Account, Alignment, Journal, Transaction},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sum of debit-aligned amounts of a journal
pub fn total_debit(journal: &Journal) -> i64 {
    journal.total_debit()
}

/// Sum of credit-aligned amounts of a journal
pub fn total_credit(journal: &Journal) -> i64 {
    journal.total_credit()
}

/// One row of a journal sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetLine {
    /// Posting ID
    pub transaction_id: String,
    /// Account posted to
    pub account_number: String,
    /// Posting description
    pub description: String,
    /// Amount (minor units)
    pub amount: i64,
}

impl From<&Transaction> for SheetLine {
    fn from(trx: &Transaction) -> Self {
        Self {
            transaction_id: trx.transaction_id.clone(),
            account_number: trx.account_number.clone(),
            description: trx.description.clone(),
            amount: trx.amount,
        }
    }
}

/// Journal with postings split by side and a totals footer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalSheet {
    pub journal_id: String,
    pub journaling_time: DateTime<Utc>,
    pub description: String,
    pub reversed_journal_id: Option<String>,
    pub debits: Vec<SheetLine>,
    pub credits: Vec<SheetLine>,
    pub total_debit: i64,
    pub total_credit: i64,
}

impl From<&Journal> for JournalSheet {
    fn from(journal: &Journal) -> Self {
        let lines = |side: Alignment| {
            journal
                .transactions
                .iter()
                .filter(|t| t.alignment == side)
                .map(SheetLine::from)
                .collect::<Vec<_>>()
        };
        Self {
            journal_id: journal.journal_id.clone(),
            journaling_time: journal.journaling_time,
            description: journal.description.clone(),
            reversed_journal_id: journal.reversed_journal_id.clone(),
            debits: lines(Alignment::Debit),
            credits: lines(Alignment::Credit),
            total_debit: total_debit(journal),
            total_credit: total_credit(journal),
        }
    }
}

/// One row of an account statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementLine {
    pub transaction_id: String,
    pub transaction_time: DateTime<Utc>,
    pub journal_id: String,
    pub description: String,
    /// Set for debit postings
    pub debit: Option<i64>,
    /// Set for credit postings
    pub credit: Option<i64>,
    /// Account balance after the posting
    pub balance: i64,
}

impl From<&Transaction> for StatementLine {
    fn from(trx: &Transaction) -> Self {
        let (debit, credit) = match trx.alignment {
            Alignment::Debit => (Some(trx.amount), None),
            Alignment::Credit => (None, Some(trx.amount)),
        };
        Self {
            transaction_id: trx.transaction_id.clone(),
            transaction_time: trx.transaction_time,
            journal_id: trx.journal_id.clone(),
            description: trx.description.clone(),
            debit,
            credit,
            balance: trx.balance,
        }
    }
}

/// Posting history of one account over a time range, one page at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatement {
    pub account_number: String,
    pub name: String,
    pub description: String,
    pub currency: String,
    pub coa: String,
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    /// Postings in range, across all pages
    pub total_transactions: u64,
    pub page: u64,
    pub total_pages: u64,
    pub lines: Vec<StatementLine>,
}

impl AccountStatement {
    /// Build a statement page
    pub fn new(
        account: &Account,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        result: PageResult,
        transactions: &[Transaction],
    ) -> Self {
        Self {
            account_number: account.account_number.clone(),
            name: account.name.clone(),
            description: account.description.clone(),
            currency: account.currency.clone(),
            coa: account.coa.clone(),
            from,
            until,
            total_transactions: result.total_entries,
            page: result.page,
            total_pages: result.total_pages,
            lines: transactions.iter().map(StatementLine::from).collect(),
        }
    }

    /// `page/total_pages` indicator
    pub fn page_indicator(&self) -> String {
        format!("{}/{}", self.page, self.total_pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageRequest;

    fn posting(id: &str, alignment: Alignment, amount: i64, balance: i64) -> Transaction {
        Transaction {
            transaction_id: id.to_string(),
            journal_id: "J1".to_string(),
            account_number: "A1".to_string(),
            alignment,
            amount,
            description: String::new(),
            balance,
            transaction_time: Utc::now(),
            created_at: Utc::now(),
            created_by: "tester".to_string(),
        }
    }

    #[test]
    fn test_statement_lines_split_sides() {
        let account = Account::builder("A1")
            .name("Cash")
            .currency("USD")
            .coa("1.1")
            .build();
        let result = PageResult::for_request(PageRequest::new(1, 10), 2);
        let statement = AccountStatement::new(
            &account,
            Utc::now(),
            Utc::now(),
            result,
            &[
                posting("T1", Alignment::Debit, 100, 1100),
                posting("T2", Alignment::Credit, 40, 1060),
            ],
        );

        assert_eq!(statement.page_indicator(), "1/1");
        assert_eq!(statement.lines[0].debit, Some(100));
        assert_eq!(statement.lines[1].credit, Some(40));
        assert_eq!(statement.lines[1].balance, 1060);

        let json = serde_json::to_value(&statement).unwrap();
        assert_eq!(json["total_transactions"], 2);
    }
}

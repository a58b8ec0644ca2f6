//! Storage records
//!
//! Flat, serializable rows exchanged with backends. Alignments are stored as the
//! text markers `DEBIT` / `CREDIT`.

#![allow(missing_docs)]

use crate::types::{Account, Alignment, Currency, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_number: String,
    pub name: String,
    pub currency_code: String,
    pub description: String,
    pub alignment: String,
    pub balance: i64,
    pub coa: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl AccountRecord {
    /// Normal balance side
    pub fn normal_side(&self) -> Alignment {
        Alignment::from_marker(&self.alignment)
    }
}

impl From<&Account> for AccountRecord {
    fn from(account: &Account) -> Self {
        Self {
            account_number: account.account_number.clone(),
            name: account.name.clone(),
            currency_code: account.currency.clone(),
            description: account.description.clone(),
            alignment: account.alignment.as_marker().to_string(),
            balance: account.balance,
            coa: account.coa.clone(),
            created_at: account.created_at,
            created_by: account.created_by.clone(),
            updated_at: account.updated_at,
            updated_by: account.updated_by.clone(),
        }
    }
}

impl From<AccountRecord> for Account {
    fn from(rec: AccountRecord) -> Self {
        let alignment = rec.normal_side();
        Self {
            account_number: rec.account_number,
            name: rec.name,
            description: rec.description,
            currency: rec.currency_code,
            coa: rec.coa,
            alignment,
            balance: rec.balance,
            created_at: rec.created_at,
            created_by: rec.created_by,
            updated_at: rec.updated_at,
            updated_by: rec.updated_by,
        }
    }
}

/// Transaction (posting) row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub transaction_time: DateTime<Utc>,
    pub account_number: String,
    pub journal_id: String,
    pub description: String,
    pub alignment: String,
    pub amount: i64,
    /// Account balance after this posting
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl From<TransactionRecord> for Transaction {
    fn from(rec: TransactionRecord) -> Self {
        let alignment = Alignment::from_marker(&rec.alignment);
        Self {
            transaction_id: rec.transaction_id,
            journal_id: rec.journal_id,
            account_number: rec.account_number,
            alignment,
            amount: rec.amount,
            description: rec.description,
            balance: rec.balance,
            transaction_time: rec.transaction_time,
            created_at: rec.created_at,
            created_by: rec.created_by,
        }
    }
}

/// Journal row (postings live in their own rows)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub journal_id: String,
    pub journaling_time: DateTime<Utc>,
    pub description: String,
    pub is_reversal: bool,
    pub reversed_journal_id: Option<String>,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// Currency row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    pub code: String,
    pub name: String,
    pub exchange: f64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl From<CurrencyRecord> for Currency {
    fn from(rec: CurrencyRecord) -> Self {
        Self {
            code: rec.code,
            name: rec.name,
            exchange: rec.exchange,
            created_at: rec.created_at,
            created_by: rec.created_by,
            updated_at: rec.updated_at,
            updated_by: rec.updated_by,
        }
    }
}

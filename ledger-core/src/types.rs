//! Core types for the ledger
//!
//! All types are plain value records:
//! - Amounts and balances are integers in minor currency units
//! - Persisted records are never mutated in place; `with_*` methods return a new record
//! - Candidates (`NewJournal`, `NewTransaction`) are built in memory and handed to
//!   the journal ledger, which assigns times and resulting balances on persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fresh time-ordered identifier for journals and postings
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Debit or Credit tag on a posting, or the normal balance side of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alignment {
    /// Debit side
    Debit,
    /// Credit side
    Credit,
}

impl Alignment {
    /// Storage marker
    pub fn as_marker(&self) -> &'static str {
        match self {
            Alignment::Debit => "DEBIT",
            Alignment::Credit => "CREDIT",
        }
    }

    /// Parse a stored marker. Anything other than `DEBIT` (any case) is Credit.
    pub fn from_marker(marker: &str) -> Self {
        if marker.eq_ignore_ascii_case("DEBIT") {
            Alignment::Debit
        } else {
            Alignment::Credit
        }
    }

    /// The other side
    pub fn opposite(&self) -> Self {
        match self {
            Alignment::Debit => Alignment::Credit,
            Alignment::Credit => Alignment::Debit,
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_marker())
    }
}

/// Apply a posting to a balance held on `normal_side`.
///
/// Same-side postings increase the balance, opposite-side postings decrease it.
/// Returns `None` on overflow.
pub fn apply_posting(balance: i64, normal_side: Alignment, posting: Alignment, amount: i64) -> Option<i64> {
    if posting == normal_side {
        balance.checked_add(amount)
    } else {
        balance.checked_sub(amount)
    }
}

/// Ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Caller-assigned account number (identity)
    pub account_number: String,

    /// Display name
    pub name: String,

    /// Description
    pub description: String,

    /// Currency code
    pub currency: String,

    /// Chart-of-accounts code
    pub coa: String,

    /// Normal balance side
    pub alignment: Alignment,

    /// Current balance (minor units)
    pub balance: i64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Creator identity
    pub created_by: String,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Last updater identity
    pub updated_by: String,
}

impl Account {
    /// Start building an account with the given number
    pub fn builder(account_number: impl Into<String>) -> AccountBuilder {
        AccountBuilder::new(account_number)
    }
}

/// Builder for [`Account`]
///
/// No validation happens here; the account registry rejects incomplete accounts.
#[derive(Debug, Clone)]
pub struct AccountBuilder {
    account_number: String,
    name: String,
    description: String,
    currency: String,
    coa: String,
    alignment: Alignment,
    balance: i64,
    created_by: String,
    updated_by: String,
}

impl AccountBuilder {
    fn new(account_number: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            name: String::new(),
            description: String::new(),
            currency: String::new(),
            coa: String::new(),
            alignment: Alignment::Debit,
            balance: 0,
            created_by: String::new(),
            updated_by: String::new(),
        }
    }

    /// Display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Currency code
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Chart-of-accounts code
    pub fn coa(mut self, coa: impl Into<String>) -> Self {
        self.coa = coa.into();
        self
    }

    /// Normal balance side
    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Opening balance
    pub fn balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    /// Creator; also the initial updater unless set otherwise
    pub fn created_by(mut self, author: impl Into<String>) -> Self {
        self.created_by = author.into();
        self
    }

    /// Updater
    pub fn updated_by(mut self, author: impl Into<String>) -> Self {
        self.updated_by = author.into();
        self
    }

    /// Finish
    pub fn build(self) -> Account {
        let now = Utc::now();
        let updated_by = if self.updated_by.is_empty() {
            self.created_by.clone()
        } else {
            self.updated_by
        };
        Account {
            account_number: self.account_number,
            name: self.name,
            description: self.description,
            currency: self.currency,
            coa: self.coa,
            alignment: self.alignment,
            balance: self.balance,
            created_at: now,
            created_by: self.created_by,
            updated_at: now,
            updated_by,
        }
    }
}

/// Currency with its exchange value against the common denominator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    /// Currency code (identity)
    pub code: String,

    /// Display name
    pub name: String,

    /// Exchange value relative to the common denominator
    pub exchange: f64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Creator identity
    pub created_by: String,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Last updater identity
    pub updated_by: String,
}

/// Unpersisted posting, part of a [`NewJournal`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Caller-assigned transaction ID
    pub transaction_id: String,

    /// Account this posting applies to
    pub account_number: String,

    /// Debit or Credit
    pub alignment: Alignment,

    /// Amount (minor units, non-negative)
    pub amount: i64,

    /// Description
    pub description: String,

    /// Business time of the posting
    pub transaction_time: DateTime<Utc>,

    /// Author
    pub created_by: String,
}

impl NewTransaction {
    /// Create a posting timestamped now
    pub fn new(
        transaction_id: impl Into<String>,
        account_number: impl Into<String>,
        alignment: Alignment,
        amount: i64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            account_number: account_number.into(),
            alignment,
            amount,
            description: String::new(),
            transaction_time: Utc::now(),
            created_by: String::new(),
        }
    }

    /// Debit posting
    pub fn debit(transaction_id: impl Into<String>, account_number: impl Into<String>, amount: i64) -> Self {
        Self::new(transaction_id, account_number, Alignment::Debit, amount)
    }

    /// Credit posting
    pub fn credit(transaction_id: impl Into<String>, account_number: impl Into<String>, amount: i64) -> Self {
        Self::new(transaction_id, account_number, Alignment::Credit, amount)
    }

    /// Description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Business time
    pub fn at(mut self, transaction_time: DateTime<Utc>) -> Self {
        self.transaction_time = transaction_time;
        self
    }

    /// Author
    pub fn created_by(mut self, author: impl Into<String>) -> Self {
        self.created_by = author.into();
        self
    }
}

/// Persisted posting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID (identity)
    pub transaction_id: String,

    /// Owning journal
    pub journal_id: String,

    /// Account this posting applied to
    pub account_number: String,

    /// Debit or Credit
    pub alignment: Alignment,

    /// Amount (minor units)
    pub amount: i64,

    /// Description
    pub description: String,

    /// Account balance after this posting was applied
    pub balance: i64,

    /// Business time of the posting
    pub transaction_time: DateTime<Utc>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Author
    pub created_by: String,
}

/// Unpersisted journal: a set of postings to be validated and persisted atomically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournal {
    /// Caller-assigned journal ID
    pub journal_id: String,

    /// Description
    pub description: String,

    /// Author
    pub created_by: String,

    /// Journal this one reverses, if any
    pub reversed_journal_id: Option<String>,

    /// Postings, in caller order
    pub transactions: Vec<NewTransaction>,
}

impl NewJournal {
    /// Empty journal candidate
    pub fn new(journal_id: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            journal_id: journal_id.into(),
            description: String::new(),
            created_by: created_by.into(),
            reversed_journal_id: None,
            transactions: Vec::new(),
        }
    }

    /// Description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as the reversal of another journal
    pub fn reverses(mut self, journal_id: impl Into<String>) -> Self {
        self.reversed_journal_id = Some(journal_id.into());
        self
    }

    /// Append a posting. Postings without an author inherit the journal's.
    pub fn posting(mut self, mut transaction: NewTransaction) -> Self {
        if transaction.created_by.is_empty() {
            transaction.created_by = self.created_by.clone();
        }
        self.transactions.push(transaction);
        self
    }

    /// Build the candidate that reverses `journal`: same accounts and amounts,
    /// opposite alignments. Transaction IDs are derived by `id_for`.
    pub fn reversal_of(
        journal: &Journal,
        journal_id: impl Into<String>,
        created_by: impl Into<String>,
        mut id_for: impl FnMut(&Transaction) -> String,
    ) -> Self {
        let mut candidate = NewJournal::new(journal_id, created_by)
            .description(format!("Reversal of {}", journal.journal_id))
            .reverses(journal.journal_id.clone());
        for trx in &journal.transactions {
            candidate = candidate.posting(
                NewTransaction::new(id_for(trx), trx.account_number.clone(), trx.alignment.opposite(), trx.amount)
                    .description(format!("Reversal of {}", trx.transaction_id)),
            );
        }
        candidate
    }
}

/// Persisted journal with its postings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Journal ID (identity)
    pub journal_id: String,

    /// Time the journal was recorded
    pub journaling_time: DateTime<Utc>,

    /// Description
    pub description: String,

    /// True if this journal reverses another
    pub is_reversal: bool,

    /// ID of the reversed journal
    pub reversed_journal_id: Option<String>,

    /// Fully hydrated reversed journal
    pub reversed_journal: Option<Box<Journal>>,

    /// Total amount (credit-side sum)
    pub amount: i64,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Author
    pub created_by: String,

    /// Postings
    pub transactions: Vec<Transaction>,
}

impl Journal {
    /// Sum of debit-aligned amounts
    pub fn total_debit(&self) -> i64 {
        total_of(&self.transactions, Alignment::Debit)
    }

    /// Sum of credit-aligned amounts
    pub fn total_credit(&self) -> i64 {
        total_of(&self.transactions, Alignment::Credit)
    }
}

fn total_of(transactions: &[Transaction], alignment: Alignment) -> i64 {
    transactions
        .iter()
        .filter(|t| t.alignment == alignment)
        .map(|t| t.amount)
        .sum()
}

//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Validation failures are detected before any write happens. Storage failures
/// raised during the write phase are returned unchanged after rollback.
#[derive(Error, Debug)]
pub enum Error {
    // Missing mandatory fields
    /// Journal has no ID
    #[error("Journal is missing its journal ID")]
    JournalMissingId,

    /// Journal carries no postings
    #[error("Journal {0} contains no transactions")]
    JournalNoTransactions(String),

    /// Journal author unknown
    #[error("Journal {0} is missing its author")]
    JournalMissingAuthor(String),

    /// A posting has no ID
    #[error("Transaction at index {index} of journal {journal_id} is missing its transaction ID")]
    TransactionMissingId {
        /// Journal under validation
        journal_id: String,
        /// Position of the offending posting
        index: usize,
    },

    /// Posting amount below zero
    #[error("Transaction {0} has a negative amount")]
    NegativeAmount(String),

    /// Sum or resulting balance does not fit the amount type
    #[error("Amount overflow in {0}")]
    AmountOverflow(String),

    /// Account has no number
    #[error("Account is missing its account number")]
    AccountMissingId,

    /// Account has no name
    #[error("Account {0} is missing its name")]
    AccountMissingName(String),

    /// Account has no description
    #[error("Account {0} is missing its description")]
    AccountMissingDescription(String),

    /// Account creator unknown
    #[error("Account {0} is missing its creator")]
    AccountMissingCreator(String),

    // Uniqueness
    /// Journal ID already in storage
    #[error("Journal already persisted: {0}")]
    JournalAlreadyPersisted(String),

    /// Transaction ID already in storage
    #[error("Transaction already persisted: {0}")]
    TransactionAlreadyPersisted(String),

    // Lookups
    /// Journal not found
    #[error("Journal not found: {0}")]
    JournalNotFound(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Currency not found
    #[error("Currency not found: {0}")]
    CurrencyNotFound(String),

    // Journal invariants
    /// Σ(debit) != Σ(credit)
    #[error("Journal not balanced: debit {debit} != credit {credit}")]
    NotBalanced {
        /// Sum of debit-aligned amounts
        debit: i128,
        /// Sum of credit-aligned amounts
        credit: i128,
    },

    /// Same account posted twice in one journal
    #[error("Account {0} appears in more than one transaction of the journal")]
    DuplicateAccountInJournal(String),

    /// Posting refers to an unknown account
    #[error("Transaction refers to an account that is not persisted: {0}")]
    AccountNotPersisted(String),

    /// Postings span more than one currency
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch {
        /// Currency of the first posting's account
        expected: String,
        /// Currency of the offending account
        found: String,
    },

    /// Target journal already reversed
    #[error("Journal {0} has already been reversed")]
    DoubleReversal(String),

    /// Reversal target could not be resolved
    #[error("Inconsistent reversal chain at journal {0}")]
    InconsistentReversalChain(String),

    /// Update of an account that was never created
    #[error("Account is not persisted: {0}")]
    AccountIsNotPersisted(String),

    /// Exchange value must be a positive finite number
    #[error("Invalid exchange value for {code}: {value}")]
    InvalidExchangeValue {
        /// Currency code
        code: String,
        /// Rejected value
        value: f64,
    },

    /// Commit or cancel of a journal that was never staged
    #[error("Journal is not staged for commit: {0}")]
    JournalNotStaged(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[cfg(feature = "rocksdb")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the lookup-miss family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::JournalNotFound(_)
                | Error::AccountNotFound(_)
                | Error::TransactionNotFound(_)
                | Error::CurrencyNotFound(_)
        )
    }

    /// Stable short label, used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::JournalMissingId
            | Error::JournalNoTransactions(_)
            | Error::JournalMissingAuthor(_)
            | Error::TransactionMissingId { .. }
            | Error::AccountMissingId
            | Error::AccountMissingName(_)
            | Error::AccountMissingDescription(_)
            | Error::AccountMissingCreator(_) => "missing_field",
            Error::NegativeAmount(_) => "negative_amount",
            Error::AmountOverflow(_) => "amount_overflow",
            Error::JournalAlreadyPersisted(_) | Error::TransactionAlreadyPersisted(_) => {
                "already_persisted"
            }
            Error::JournalNotFound(_)
            | Error::AccountNotFound(_)
            | Error::TransactionNotFound(_)
            | Error::CurrencyNotFound(_) => "not_found",
            Error::NotBalanced { .. } => "not_balanced",
            Error::DuplicateAccountInJournal(_) => "duplicate_account",
            Error::AccountNotPersisted(_) => "account_not_persisted",
            Error::CurrencyMismatch { .. } => "currency_mismatch",
            Error::DoubleReversal(_) => "double_reversal",
            Error::InconsistentReversalChain(_) => "inconsistent_reversal_chain",
            Error::AccountIsNotPersisted(_) => "is_not_persisted",
            Error::InvalidExchangeValue { .. } => "invalid_exchange_value",
            Error::JournalNotStaged(_) => "not_staged",
            Error::Storage(_) => "storage",
            #[cfg(feature = "rocksdb")]
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

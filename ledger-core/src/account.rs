//! Account registry
//!
//! Owns account identity, currency and normal balance side. Balances are only
//! moved by the journal ledger; [`AccountRegistry::update_account`] overwrites
//! descriptive fields and keeps the creation audit of the stored row.

use crate::{
    page::{Page, PageRequest, PageResult},
    storage::{AccountRecord, AccountStore, CurrencyStore, UnitOfWorkSource},
    types::{Account, AccountBuilder},
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;

/// Account registry over an account and currency store
#[derive(Debug)]
pub struct AccountRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for AccountRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

fn validate_fields(account: &Account) -> Result<()> {
    if account.account_number.is_empty() {
        return Err(Error::AccountMissingId);
    }
    let number = &account.account_number;
    if account.name.is_empty() {
        return Err(Error::AccountMissingName(number.clone()));
    }
    if account.description.is_empty() {
        return Err(Error::AccountMissingDescription(number.clone()));
    }
    if account.created_by.is_empty() {
        return Err(Error::AccountMissingCreator(number.clone()));
    }
    Ok(())
}

impl<S: AccountStore + CurrencyStore + UnitOfWorkSource> AccountRegistry<S> {
    /// Create registry
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Empty account builder
    pub fn new_account(&self, account_number: impl Into<String>) -> AccountBuilder {
        Account::builder(account_number)
    }

    fn require_currency(&self, account: &Account) -> Result<()> {
        if self.store.get_currency(&account.currency)?.is_none() {
            tracing::error!(
                account = %account.account_number,
                currency = %account.currency,
                "Account currency is not registered"
            );
            return Err(Error::CurrencyNotFound(account.currency.clone()));
        }
        Ok(())
    }

    /// Register a new account
    pub fn persist_account(&self, account: &Account) -> Result<()> {
        validate_fields(account)?;
        self.require_currency(account)?;

        self.store.insert_account(&AccountRecord::from(account))?;
        tracing::info!(
            account = %account.account_number,
            currency = %account.currency,
            alignment = %account.alignment,
            "Account persisted"
        );
        Ok(())
    }

    /// Overwrite the descriptive fields of an existing account.
    ///
    /// The balance and creation audit always come from the stored row; the
    /// rewrite runs in a unit of work so it cannot interleave with a posting.
    pub fn update_account(&self, account: &Account) -> Result<()> {
        validate_fields(account)?;

        if self.store.get_account(&account.account_number)?.is_none() {
            return Err(Error::AccountIsNotPersisted(account.account_number.clone()));
        }
        self.require_currency(account)?;

        let updated_by = if account.updated_by.is_empty() {
            account.created_by.clone()
        } else {
            account.updated_by.clone()
        };

        let mut uow = self.store.begin()?;
        let stored = uow
            .get_account(&account.account_number)?
            .ok_or_else(|| Error::AccountIsNotPersisted(account.account_number.clone()))?;
        if stored.balance != account.balance {
            tracing::debug!(
                account = %account.account_number,
                stored = stored.balance,
                given = account.balance,
                "Ignoring balance on account update"
            );
        }
        let record = AccountRecord {
            balance: stored.balance,
            created_at: stored.created_at,
            created_by: stored.created_by,
            updated_at: Utc::now(),
            updated_by,
            ..AccountRecord::from(account)
        };
        uow.update_account(record)?;
        uow.commit()?;

        tracing::info!(account = %account.account_number, "Account updated");
        Ok(())
    }

    /// Whether an account with this number exists
    pub fn is_account_id_exist(&self, account_number: &str) -> Result<bool> {
        Ok(self.store.get_account(account_number)?.is_some())
    }

    /// Load an account
    pub fn get_account_by_id(&self, account_number: &str) -> Result<Account> {
        tracing::debug!(account = %account_number, "Loading account");
        self.store
            .get_account(account_number)?
            .map(Account::from)
            .ok_or_else(|| Error::AccountNotFound(account_number.to_string()))
    }

    /// All accounts, ordered by name
    pub fn list_accounts(&self, request: PageRequest) -> Result<Page<Account>> {
        let total = self.store.count_accounts()?;
        let result = PageResult::for_request(request, total);
        let rows = self.store.list_accounts(result.offset, result.page_size)?;
        Ok(to_page(result, rows))
    }

    /// Accounts whose chart-of-accounts code starts with `coa`
    pub fn list_account_by_coa(&self, coa: &str, request: PageRequest) -> Result<Page<Account>> {
        let total = self.store.count_accounts_by_coa(coa)?;
        let result = PageResult::for_request(request, total);
        let rows = self
            .store
            .list_accounts_by_coa(coa, result.offset, result.page_size)?;
        Ok(to_page(result, rows))
    }

    /// Accounts whose name contains `name_like`, ignoring case
    pub fn find_accounts(&self, name_like: &str, request: PageRequest) -> Result<Page<Account>> {
        let total = self.store.count_accounts_by_name(name_like)?;
        let result = PageResult::for_request(request, total);
        let rows = self
            .store
            .find_accounts_by_name(name_like, result.offset, result.page_size)?;
        Ok(to_page(result, rows))
    }
}

fn to_page(result: PageResult, rows: Vec<AccountRecord>) -> Page<Account> {
    Page {
        result,
        items: rows.into_iter().map(Account::from).collect(),
    }
}

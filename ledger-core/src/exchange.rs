//! Currency exchange
//!
//! Every currency stores an exchange value relative to a common denominator owned
//! by the table instance. The rate between two currencies pivots through that
//! denominator:
//!
//! ```text
//! rate(from, to) = (denom / value(from)) * value(to) / denom
//! ```
//!
//! The expression is evaluated exactly as written in `f64`, not simplified.

use crate::{
    storage::{CurrencyRecord, CurrencyStore},
    types::Currency,
    Error, Result,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;

/// Default common denominator
pub const DEFAULT_COMMON_DENOMINATOR: f64 = 1.0;

/// Exchange rate table over a currency store
#[derive(Debug)]
pub struct ExchangeRateTable<S> {
    store: Arc<S>,
    common_denominator: RwLock<f64>,
}

fn valid_value(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl<S: CurrencyStore> ExchangeRateTable<S> {
    /// Table with the default denominator
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            common_denominator: RwLock::new(DEFAULT_COMMON_DENOMINATOR),
        }
    }

    /// Table with an explicit denominator
    pub fn with_denominator(store: Arc<S>, denom: f64) -> Result<Self> {
        let table = Self::new(store);
        table.set_denom(denom)?;
        Ok(table)
    }

    /// Whether the currency is supported. Absence is not an error.
    pub fn is_currency_exist(&self, code: &str) -> Result<bool> {
        Ok(self.store.get_currency(code)?.is_some())
    }

    /// Current common denominator
    pub fn get_denom(&self) -> f64 {
        *self.common_denominator.read()
    }

    /// Replace the common denominator
    pub fn set_denom(&self, denom: f64) -> Result<()> {
        if !valid_value(denom) {
            return Err(Error::InvalidExchangeValue {
                code: "common denominator".to_string(),
                value: denom,
            });
        }
        *self.common_denominator.write() = denom;
        tracing::debug!(denom, "Common denominator set");
        Ok(())
    }

    /// Set the exchange value of `code`, registering the currency if unknown
    pub fn set_exchange_value_of(&self, code: &str, exchange: f64, author: &str) -> Result<()> {
        if !valid_value(exchange) {
            return Err(Error::InvalidExchangeValue {
                code: code.to_string(),
                value: exchange,
            });
        }

        let now = Utc::now();
        match self.store.get_currency(code)? {
            None => {
                let rec = CurrencyRecord {
                    code: code.to_string(),
                    name: code.to_string(),
                    exchange,
                    created_at: now,
                    created_by: author.to_string(),
                    updated_at: now,
                    updated_by: author.to_string(),
                };
                self.store.insert_currency(&rec)?;
                tracing::info!(currency = %code, exchange, "Currency registered");
            }
            Some(rec) => {
                let rec = CurrencyRecord {
                    exchange,
                    updated_at: now,
                    updated_by: author.to_string(),
                    ..rec
                };
                self.store.update_currency(&rec)?;
                tracing::info!(currency = %code, exchange, "Exchange value updated");
            }
        }
        Ok(())
    }

    /// Exchange value of `code`
    pub fn get_exchange_value_of(&self, code: &str) -> Result<f64> {
        Ok(self.get_currency(code)?.exchange)
    }

    /// Full currency record
    pub fn get_currency(&self, code: &str) -> Result<Currency> {
        self.store
            .get_currency(code)?
            .map(Currency::from)
            .ok_or_else(|| Error::CurrencyNotFound(code.to_string()))
    }

    /// Rate for converting `from` into `to`. A currency against itself is exactly 1.0.
    pub fn calculate_exchange_rate(&self, from: &str, to: &str) -> Result<f64> {
        let from_value = self.get_exchange_value_of(from)?;
        if from == to {
            return Ok(1.0);
        }
        let to_value = self.get_exchange_value_of(to)?;

        let denom = self.get_denom();
        let m1 = denom / from_value;
        let m2 = m1 * to_value;
        Ok(m2 / denom)
    }

    /// Convert `amount` of `from` into `to`, truncating toward zero
    pub fn calculate_exchange(&self, from: &str, to: &str, amount: i64) -> Result<i64> {
        let rate = self.calculate_exchange_rate(from, to)?;
        let converted = amount as f64 * rate;
        Ok(converted as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn table() -> ExchangeRateTable<InMemoryStore> {
        let table = ExchangeRateTable::new(Arc::new(InMemoryStore::new()));
        table.set_exchange_value_of("USD", 1.0, "tester").unwrap();
        table.set_exchange_value_of("EUR", 0.5, "tester").unwrap();
        table
    }

    #[test]
    fn test_unknown_currency() {
        let table = table();
        assert!(!table.is_currency_exist("JPY").unwrap());
        assert!(matches!(
            table.get_exchange_value_of("JPY"),
            Err(Error::CurrencyNotFound(code)) if code == "JPY"
        ));
        assert!(table.calculate_exchange_rate("USD", "JPY").is_err());
        assert!(table.calculate_exchange_rate("JPY", "JPY").is_err());
    }

    #[test]
    fn test_register_then_update() {
        let table = table();
        let eur = table.get_currency("EUR").unwrap();
        assert_eq!(eur.name, "EUR");
        assert_eq!(eur.exchange, 0.5);

        table.set_exchange_value_of("EUR", 0.8, "bob").unwrap();
        let eur = table.get_currency("EUR").unwrap();
        assert_eq!(eur.exchange, 0.8);
        assert_eq!(eur.created_by, "tester");
        assert_eq!(eur.updated_by, "bob");
    }

    #[test]
    fn test_rates() {
        let table = table();
        assert_eq!(table.calculate_exchange_rate("USD", "EUR").unwrap(), 0.5);
        assert_eq!(table.calculate_exchange_rate("EUR", "USD").unwrap(), 2.0);
        assert_eq!(table.calculate_exchange_rate("EUR", "EUR").unwrap(), 1.0);
    }

    #[test]
    fn test_exchange_truncates_toward_zero() {
        let table = table();
        assert_eq!(table.calculate_exchange("EUR", "USD", 150).unwrap(), 300);
        assert_eq!(table.calculate_exchange("USD", "EUR", 3).unwrap(), 1);
        assert_eq!(table.calculate_exchange("USD", "EUR", -3).unwrap(), -1);
        assert_eq!(table.calculate_exchange("USD", "USD", 12345).unwrap(), 12345);
    }

    #[test]
    fn test_denominator_is_per_instance() {
        let store = Arc::new(InMemoryStore::new());
        let a = ExchangeRateTable::new(store.clone());
        let b = ExchangeRateTable::with_denominator(store, 2.0).unwrap();
        assert_eq!(a.get_denom(), DEFAULT_COMMON_DENOMINATOR);
        assert_eq!(b.get_denom(), 2.0);

        a.set_exchange_value_of("USD", 1.0, "tester").unwrap();
        a.set_exchange_value_of("EUR", 0.5, "tester").unwrap();
        assert_eq!(b.calculate_exchange_rate("EUR", "USD").unwrap(), 2.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let table = table();
        assert!(matches!(
            table.set_exchange_value_of("XXX", 0.0, "tester"),
            Err(Error::InvalidExchangeValue { .. })
        ));
        assert!(table.set_exchange_value_of("XXX", f64::NAN, "tester").is_err());
        assert!(table.set_denom(-1.0).is_err());
        assert!(!table.is_currency_exist("XXX").unwrap());
    }
}

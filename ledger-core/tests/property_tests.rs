//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Running balances: every posting records the balance it produced
//! - Balance: unbalanced journals are rejected with no side effects
//! - Uniqueness: a journal ID is persisted once
//! - Pagination: pages partition the listing

use proptest::prelude::*;
use std::{collections::HashMap, sync::Arc};
use wallet_ledger::{
    Alignment, Config, Error, InMemoryStore, Ledger, NewJournal, NewTransaction, PageRequest,
};

const ACCOUNTS: [(&str, Alignment); 4] = [
    ("CASH", Alignment::Debit),
    ("FEES", Alignment::Debit),
    ("WALLET", Alignment::Credit),
    ("REVENUE", Alignment::Credit),
];

fn create_test_ledger(opening: i64) -> Ledger<InMemoryStore> {
    let ledger = Ledger::with_store(Arc::new(InMemoryStore::new()), Config::default()).unwrap();
    ledger.exchange().set_exchange_value_of("USD", 1.0, "prop").unwrap();
    for (number, side) in ACCOUNTS {
        let account = ledger
            .accounts()
            .new_account(number)
            .name(number)
            .description("property account")
            .currency("USD")
            .alignment(side)
            .balance(opening)
            .created_by("prop")
            .build();
        ledger.accounts().persist_account(&account).unwrap();
    }
    ledger
}

/// Strategy for generating valid amounts (minor units)
fn amount_strategy() -> impl Strategy<Value = i64> {
    0i64..1_000_000
}

/// Strategy for a balanced two-legged journal over distinct accounts
fn journal_strategy() -> impl Strategy<Value = (usize, usize, i64)> {
    (0usize..ACCOUNTS.len(), 1usize..ACCOUNTS.len(), amount_strategy())
        .prop_map(|(debit, offset, amount)| (debit, (debit + offset) % ACCOUNTS.len(), amount))
}

fn apply(balance: i64, normal_side: Alignment, posting: Alignment, amount: i64) -> i64 {
    if normal_side == posting {
        balance + amount
    } else {
        balance - amount
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every posting records the balance reached by applying it to the
    /// previous one, and the stored balance equals the last posting's.
    #[test]
    fn prop_running_balances(journals in prop::collection::vec(journal_strategy(), 1..30)) {
        let ledger = create_test_ledger(10_000_000);
        let mut expected: HashMap<&str, i64> =
            ACCOUNTS.iter().map(|(number, _)| (*number, 10_000_000)).collect();

        for (i, (debit, credit, amount)) in journals.iter().enumerate() {
            let (debit_account, debit_side) = ACCOUNTS[*debit];
            let (credit_account, credit_side) = ACCOUNTS[*credit];

            let journal = NewJournal::new(format!("J{}", i), "prop")
                .posting(NewTransaction::debit(format!("J{}-D", i), debit_account, *amount))
                .posting(NewTransaction::credit(format!("J{}-C", i), credit_account, *amount));
            ledger.journals().persist_journal(&journal).unwrap();

            let debit_balance = apply(expected[debit_account], debit_side, Alignment::Debit, *amount);
            let credit_balance = apply(expected[credit_account], credit_side, Alignment::Credit, *amount);
            expected.insert(debit_account, debit_balance);
            expected.insert(credit_account, credit_balance);

            let persisted = ledger.journals().get_journal_by_id(&format!("J{}", i)).unwrap();
            prop_assert_eq!(persisted.total_debit(), persisted.total_credit());
            let balance_on = |account: &str| {
                persisted
                    .transactions
                    .iter()
                    .find(|t| t.account_number == account)
                    .map(|t| t.balance)
            };
            prop_assert_eq!(balance_on(debit_account), Some(debit_balance));
            prop_assert_eq!(balance_on(credit_account), Some(credit_balance));
        }

        for (number, _) in ACCOUNTS {
            let account = ledger.accounts().get_account_by_id(number).unwrap();
            prop_assert_eq!(account.balance, expected[number]);
        }
    }

    /// Journals whose sides differ are rejected and leave balances alone
    #[test]
    fn prop_unbalanced_rejected(debit in amount_strategy(), credit in amount_strategy()) {
        prop_assume!(debit != credit);
        let ledger = create_test_ledger(0);

        let journal = NewJournal::new("J", "prop")
            .posting(NewTransaction::debit("D", "CASH", debit))
            .posting(NewTransaction::credit("C", "WALLET", credit));
        let rejected = matches!(
            ledger.journals().persist_journal(&journal),
            Err(Error::NotBalanced { .. })
        );
        prop_assert!(rejected);

        prop_assert_eq!(ledger.accounts().get_account_by_id("CASH").unwrap().balance, 0);
        prop_assert_eq!(ledger.accounts().get_account_by_id("WALLET").unwrap().balance, 0);
        prop_assert!(!ledger.journals().is_journal_id_exist("J").unwrap());
    }

    /// The second persist of a journal ID fails and changes nothing
    #[test]
    fn prop_journal_id_unique(first in 1i64..1000, second in 1i64..1000) {
        let ledger = create_test_ledger(0);

        let journal = |amount: i64, suffix: &str| {
            NewJournal::new("J", "prop")
                .posting(NewTransaction::debit(format!("D{}", suffix), "CASH", amount))
                .posting(NewTransaction::credit(format!("C{}", suffix), "WALLET", amount))
        };
        ledger.journals().persist_journal(&journal(first, "1")).unwrap();

        let duplicate = matches!(
            ledger.journals().persist_journal(&journal(second, "2")),
            Err(Error::JournalAlreadyPersisted(_))
        );
        prop_assert!(duplicate);
        prop_assert_eq!(ledger.accounts().get_account_by_id("CASH").unwrap().balance, first);
        prop_assert_eq!(ledger.accounts().get_account_by_id("WALLET").unwrap().balance, first);
    }

    /// Pages cover every account exactly once, with ceil(n / size) pages
    #[test]
    fn prop_pagination_partitions(extra in 0usize..40, page_size in 1u64..12) {
        let ledger = create_test_ledger(0);
        for i in 0..extra {
            let account = ledger
                .accounts()
                .new_account(format!("X{:03}", i))
                .name(format!("extra {:03}", i))
                .description("filler")
                .currency("USD")
                .created_by("prop")
                .build();
            ledger.accounts().persist_account(&account).unwrap();
        }

        let total = (ACCOUNTS.len() + extra) as u64;
        let expected_pages = (total + page_size - 1) / page_size;

        let mut seen = Vec::new();
        for page in 1..=expected_pages {
            let listed = ledger.accounts().list_accounts(PageRequest::new(page, page_size)).unwrap();
            prop_assert_eq!(listed.result.total_entries, total);
            prop_assert_eq!(listed.result.total_pages, expected_pages);
            prop_assert!(listed.len() as u64 <= page_size);
            seen.extend(listed.items.into_iter().map(|a| a.account_number));
        }

        prop_assert_eq!(seen.len() as u64, total);
        seen.sort();
        seen.dedup();
        prop_assert_eq!(seen.len() as u64, total);
    }

    /// Conversion between one currency and itself is the identity
    #[test]
    fn prop_same_currency_exchange(value in 0.01f64..100_000.0, denom in 0.5f64..10_000.0, amount in -1_000_000i64..1_000_000) {
        let ledger = create_test_ledger(0);
        ledger.exchange().set_denom(denom).unwrap();
        ledger.exchange().set_exchange_value_of("EUR", value, "prop").unwrap();

        prop_assert_eq!(ledger.exchange().calculate_exchange_rate("EUR", "EUR").unwrap(), 1.0);
        prop_assert_eq!(ledger.exchange().calculate_exchange("EUR", "EUR", amount).unwrap(), amount);
    }
}

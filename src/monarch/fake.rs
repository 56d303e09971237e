//! In-memory [`MonarchApi`] used by unit tests.

#![allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test double; a poisoned lock is a test failure"
)]

extern crate alloc;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Barrier;

use super::models::{
    Account, AccountKind, AccountRef, BudgetPlan, CashflowPage, Holding, NamedRef,
    NewTransaction, Transaction, TransactionPage, TransactionQuery, TransactionUpdate,
};
use super::{MonarchApi, MonarchError};

/// Builds an account with a type and institution.
pub(crate) fn account(id: &str, name: &str) -> Account {
    Account {
        id: id.to_owned(),
        display_name: Some(name.to_owned()),
        current_balance: Some(1_000.0),
        kind: Some(AccountKind {
            name: Some("depository".to_owned()),
            display: Some("Cash".to_owned()),
        }),
        institution: Some(NamedRef {
            id: None,
            name: Some("Test Bank".to_owned()),
        }),
        ..Account::default()
    }
}

/// Builds a posted transaction.
pub(crate) fn transaction(
    id: &str,
    account_id: &str,
    date: NaiveDate,
    amount: f64,
    merchant: &str,
) -> Transaction {
    Transaction {
        id: id.to_owned(),
        date,
        amount,
        pending: false,
        plaid_name: Some(merchant.to_uppercase()),
        notes: None,
        hide_from_reports: false,
        needs_review: false,
        category: Some(NamedRef {
            id: Some("cat-food".to_owned()),
            name: Some("Groceries".to_owned()),
        }),
        merchant: Some(NamedRef {
            id: None,
            name: Some(merchant.to_owned()),
        }),
        account: Some(AccountRef {
            id: account_id.to_owned(),
            display_name: None,
        }),
    }
}

/// Fake Monarch backend holding accounts and transactions in memory.
#[derive(Debug, Default)]
pub(crate) struct FakeMonarch {
    accounts: Vec<Account>,
    transactions: Mutex<Vec<Transaction>>,
    holdings: HashMap<String, Vec<Holding>>,
    budget: BudgetPlan,
    cashflow: CashflowPage,
    expired: AtomicBool,
    rendezvous: Option<Arc<Barrier>>,
    calls: AtomicUsize,
    next_id: AtomicU64,
    refreshed: Mutex<Vec<String>>,
}

impl FakeMonarch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_account(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    pub(crate) fn with_transaction(self, transaction: Transaction) -> Self {
        self.transactions
            .lock()
            .expect("transactions lock")
            .push(transaction);
        self
    }

    pub(crate) fn with_holdings(mut self, account_id: &str, holdings: Vec<Holding>) -> Self {
        let _previous = self.holdings.insert(account_id.to_owned(), holdings);
        self
    }

    pub(crate) fn with_budget(mut self, budget: BudgetPlan) -> Self {
        self.budget = budget;
        self
    }

    pub(crate) fn with_cashflow(mut self, cashflow: CashflowPage) -> Self {
        self.cashflow = cashflow;
        self
    }

    /// Makes every transaction listing wait on `barrier` before answering.
    pub(crate) fn with_rendezvous(mut self, barrier: Arc<Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    /// Makes every later call fail as if the token had been revoked.
    pub(crate) fn expire(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    /// Number of API calls received so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Account IDs passed to refresh requests.
    pub(crate) fn refreshed(&self) -> Vec<String> {
        self.refreshed.lock().expect("refreshed lock").clone()
    }

    fn enter(&self) -> Result<(), MonarchError> {
        let _previous = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.expired.load(Ordering::SeqCst) {
            return Err(MonarchError::SessionExpired);
        }
        Ok(())
    }

    fn find_account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == id)
    }
}

#[async_trait]
impl MonarchApi for FakeMonarch {
    async fn accounts(&self) -> Result<Vec<Account>, MonarchError> {
        self.enter()?;
        Ok(self.accounts.clone())
    }

    async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, MonarchError> {
        self.enter()?;
        if let Some(barrier) = self.rendezvous.as_ref() {
            let _leader = barrier.wait().await;
        }
        let mut matching: Vec<Transaction> = self
            .transactions
            .lock()
            .expect("transactions lock")
            .iter()
            .filter(|tx| query.start_date.is_none_or(|start| tx.date >= start))
            .filter(|tx| query.end_date.is_none_or(|end| tx.date <= end))
            .filter(|tx| {
                query.account_id.as_deref().is_none_or(|id| {
                    tx.account.as_ref().is_some_and(|account| account.id == id)
                })
            })
            .filter(|tx| {
                query.category_id.as_deref().is_none_or(|id| {
                    tx.category
                        .as_ref()
                        .is_some_and(|category| category.id.as_deref() == Some(id))
                })
            })
            .filter(|tx| {
                query.search.as_deref().is_none_or(|needle| {
                    tx.merchant
                        .as_ref()
                        .and_then(|merchant| merchant.name.as_deref())
                        .is_some_and(|name| name.contains(needle))
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|left, right| right.date.cmp(&left.date));
        let total = matching.len();
        let results = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(TransactionPage {
            total_count: u64::try_from(total).ok(),
            results,
        })
    }

    async fn budgets(&self, _start: NaiveDate, _end: NaiveDate) -> Result<BudgetPlan, MonarchError> {
        self.enter()?;
        Ok(self.budget.clone())
    }

    async fn cashflow(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<CashflowPage, MonarchError> {
        self.enter()?;
        Ok(self.cashflow.clone())
    }

    async fn holdings(&self, account_id: &str) -> Result<Vec<Holding>, MonarchError> {
        self.enter()?;
        self.holdings.get(account_id).cloned().ok_or_else(|| {
            MonarchError::GraphQl(format!("no portfolio found for account {account_id}"))
        })
    }

    async fn create_transaction(
        &self,
        input: &NewTransaction,
    ) -> Result<Transaction, MonarchError> {
        self.enter()?;
        let account = self
            .find_account(&input.account_id)
            .ok_or_else(|| MonarchError::Mutation(format!("account {} not found", input.account_id)))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = Transaction {
            id: format!("created-{id}"),
            date: input.date,
            amount: input.amount,
            pending: false,
            plaid_name: None,
            notes: input.notes.clone(),
            hide_from_reports: false,
            needs_review: false,
            category: Some(NamedRef {
                id: Some(input.category_id.clone()),
                name: None,
            }),
            merchant: Some(NamedRef {
                id: None,
                name: Some(input.merchant_name.clone()),
            }),
            account: Some(AccountRef {
                id: account.id.clone(),
                display_name: account.display_name.clone(),
            }),
        };
        self.transactions
            .lock()
            .expect("transactions lock")
            .push(created.clone());
        Ok(created)
    }

    async fn update_transaction(
        &self,
        update: &TransactionUpdate,
    ) -> Result<Transaction, MonarchError> {
        self.enter()?;
        let mut transactions = self.transactions.lock().expect("transactions lock");
        let tx = transactions
            .iter_mut()
            .find(|tx| tx.id == update.id)
            .ok_or_else(|| MonarchError::Mutation(format!("transaction {} not found", update.id)))?;
        if let Some(amount) = update.amount {
            tx.amount = amount;
        }
        if let Some(name) = update.merchant_name.as_ref() {
            tx.merchant = Some(NamedRef {
                id: None,
                name: Some(name.clone()),
            });
        }
        if let Some(category_id) = update.category_id.as_ref() {
            tx.category = Some(NamedRef {
                id: Some(category_id.clone()),
                name: None,
            });
        }
        if let Some(date) = update.date {
            tx.date = date;
        }
        if let Some(notes) = update.notes.as_ref() {
            tx.notes = Some(notes.clone());
        }
        if let Some(hide) = update.hide_from_reports {
            tx.hide_from_reports = hide;
        }
        if let Some(review) = update.needs_review {
            tx.needs_review = review;
        }
        Ok(tx.clone())
    }

    async fn request_refresh(&self, account_ids: &[String]) -> Result<bool, MonarchError> {
        self.enter()?;
        self.refreshed
            .lock()
            .expect("refreshed lock")
            .extend(account_ids.iter().cloned());
        Ok(true)
    }
}

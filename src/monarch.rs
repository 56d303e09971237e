//! Minimal Monarch Money API client.
//!
//! [`MonarchApi`] is the seam the gateway depends on; [`MonarchClient`] is
//! the HTTP implementation used in production.

mod client;
mod error;
#[cfg(test)]
pub(crate) mod fake;
pub(crate) mod models;
mod queries;

use async_trait::async_trait;
use chrono::NaiveDate;

pub(crate) use self::client::MonarchClient;
pub(crate) use self::error::MonarchError;
use self::models::{
    Account, BudgetPlan, CashflowPage, Holding, NewTransaction, Transaction, TransactionPage,
    TransactionQuery, TransactionUpdate,
};

/// Operations the gateway performs against Monarch Money.
///
/// Implementations must be safe to call concurrently: one handle is shared
/// by every in-flight tool call.
#[async_trait]
pub(crate) trait MonarchApi: Send + Sync {
    /// Lists all accounts.
    async fn accounts(&self) -> Result<Vec<Account>, MonarchError>;

    /// Lists one page of transactions matching `query`, newest first.
    async fn transactions(&self, query: &TransactionQuery)
    -> Result<TransactionPage, MonarchError>;

    /// Fetches budget amounts for the months between `start` and `end`.
    async fn budgets(&self, start: NaiveDate, end: NaiveDate) -> Result<BudgetPlan, MonarchError>;

    /// Fetches income/expense aggregates between `start` and `end`.
    async fn cashflow(&self, start: NaiveDate, end: NaiveDate)
    -> Result<CashflowPage, MonarchError>;

    /// Lists investment holdings of one account.
    async fn holdings(&self, account_id: &str) -> Result<Vec<Holding>, MonarchError>;

    /// Creates a manual transaction and returns it.
    async fn create_transaction(&self, input: &NewTransaction)
    -> Result<Transaction, MonarchError>;

    /// Applies the set fields of `update` and returns the transaction.
    async fn update_transaction(
        &self,
        update: &TransactionUpdate,
    ) -> Result<Transaction, MonarchError>;

    /// Asks Monarch to re-sync the given accounts. Does not wait for the
    /// sync to finish; returns whether the request was queued.
    async fn request_refresh(&self, account_ids: &[String]) -> Result<bool, MonarchError>;
}

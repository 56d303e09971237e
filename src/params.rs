//! Parameter structs for MCP tool inputs.
//!
//! Each struct derives [`serde::Deserialize`] and [`schemars::JsonSchema`]
//! so that `rmcp` can auto-generate JSON schemas for tool parameters.

use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for the `get_transactions` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct GetTransactionsParams {
    /// Start date (inclusive), format `YYYY-MM-DD`. Requires `end_date`.
    pub(crate) start_date: Option<String>,
    /// End date (inclusive), format `YYYY-MM-DD`. Requires `start_date`.
    pub(crate) end_date: Option<String>,
    /// Filter by account ID.
    pub(crate) account_id: Option<String>,
    /// Filter by category ID.
    pub(crate) category_id: Option<String>,
    /// Free-text search over merchant and description.
    pub(crate) search: Option<String>,
    /// Number of transactions to return (default 100, clamped to 1..=1000).
    pub(crate) limit: Option<i64>,
    /// Number of transactions to skip (default 0).
    pub(crate) offset: Option<i64>,
}

/// Parameters for the `get_budgets` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct GetBudgetsParams {
    /// Budget month, format `YYYY-MM`. Defaults to last month through next month.
    pub(crate) month: Option<String>,
}

/// Parameters for the `get_cashflow` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct GetCashflowParams {
    /// Start date (inclusive), format `YYYY-MM-DD`. Defaults to the first day of this month.
    pub(crate) start_date: Option<String>,
    /// End date (inclusive), format `YYYY-MM-DD`. Defaults to the last day of this month.
    pub(crate) end_date: Option<String>,
}

/// Parameters for the `get_account_holdings` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct GetAccountHoldingsParams {
    /// Investment account ID.
    pub(crate) account_id: String,
}

/// Parameters for the `create_transaction` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub(crate) struct CreateTransactionParams {
    /// Account to add the transaction to.
    pub(crate) account_id: String,
    /// Signed amount: negative for expenses (debits), positive for income (credits).
    pub(crate) amount: f64,
    /// Transaction date, format `YYYY-MM-DD`.
    pub(crate) date: String,
    /// Description, stored as the merchant name.
    pub(crate) description: String,
    /// Category ID.
    pub(crate) category_id: String,
    /// Free-form notes.
    pub(crate) notes: Option<String>,
    /// Adjust the account balance by the amount (default `false`).
    #[serde(default)]
    pub(crate) update_balance: bool,
}

/// Parameters for the `update_transaction` tool. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct UpdateTransactionParams {
    /// Transaction to update.
    pub(crate) transaction_id: String,
    /// New signed amount.
    pub(crate) amount: Option<f64>,
    /// New description (merchant name).
    pub(crate) description: Option<String>,
    /// New category ID.
    pub(crate) category_id: Option<String>,
    /// New date, format `YYYY-MM-DD`.
    pub(crate) date: Option<String>,
    /// New notes.
    pub(crate) notes: Option<String>,
    /// Exclude from (`true`) or include in (`false`) reports.
    pub(crate) hide_from_reports: Option<bool>,
    /// Set or clear the needs-review flag.
    pub(crate) needs_review: Option<bool>,
}

/// Parameters for the `refresh_accounts` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub(crate) struct RefreshAccountsParams {
    /// Accounts to refresh. Defaults to every account.
    pub(crate) account_ids: Option<Vec<String>>,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use super::{
        CreateTransactionParams, GetAccountHoldingsParams, GetBudgetsParams, GetCashflowParams,
        GetTransactionsParams, RefreshAccountsParams, UpdateTransactionParams,
    };

    #[test]
    fn get_transactions_minimal() {
        let json = r#"{}"#;
        let params: GetTransactionsParams =
            serde_json::from_str(json).expect("should deserialize empty");
        assert!(params.start_date.is_none());
        assert!(params.end_date.is_none());
        assert!(params.account_id.is_none());
        assert!(params.category_id.is_none());
        assert!(params.search.is_none());
        assert!(params.limit.is_none());
        assert!(params.offset.is_none());
    }

    #[test]
    fn get_transactions_accepts_out_of_range_limit() {
        let json = r#"{"limit": -5, "offset": -1, "account_id": "acc-001"}"#;
        let params: GetTransactionsParams =
            serde_json::from_str(json).expect("negative values deserialize for clamping");
        assert_eq!(params.limit, Some(-5));
        assert_eq!(params.offset, Some(-1));
        assert_eq!(params.account_id.as_deref(), Some("acc-001"));
    }

    #[test]
    fn get_budgets_with_month() {
        let json = r#"{"month": "2024-06"}"#;
        let params: GetBudgetsParams =
            serde_json::from_str(json).expect("should deserialize with month");
        assert_eq!(params.month.as_deref(), Some("2024-06"));
    }

    #[test]
    fn get_cashflow_range() {
        let json = r#"{"start_date": "2024-01-01", "end_date": "2024-01-31"}"#;
        let params: GetCashflowParams = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(params.start_date.as_deref(), Some("2024-01-01"));
        assert_eq!(params.end_date.as_deref(), Some("2024-01-31"));
    }

    #[test]
    fn holdings_require_account() {
        let json = r#"{}"#;
        assert!(serde_json::from_str::<GetAccountHoldingsParams>(json).is_err());
    }

    #[test]
    fn create_transaction_params() {
        let json = r#"{
            "account_id": "acc-001",
            "amount": -12.5,
            "date": "2024-06-15",
            "description": "Coffee Shop",
            "category_id": "cat-001",
            "notes": "Morning coffee"
        }"#;
        let params: CreateTransactionParams =
            serde_json::from_str(json).expect("should deserialize");
        assert_eq!(params.account_id, "acc-001");
        assert!((params.amount + 12.5).abs() < f64::EPSILON);
        assert_eq!(params.date, "2024-06-15");
        assert_eq!(params.description, "Coffee Shop");
        assert_eq!(params.category_id, "cat-001");
        assert_eq!(params.notes.as_deref(), Some("Morning coffee"));
        assert!(!params.update_balance);
    }

    #[test]
    fn create_transaction_requires_category() {
        let json = r#"{
            "account_id": "acc-001",
            "amount": -12.5,
            "date": "2024-06-15",
            "description": "Coffee Shop"
        }"#;
        assert!(serde_json::from_str::<CreateTransactionParams>(json).is_err());
    }

    #[test]
    fn update_transaction_single_field() {
        let json = r#"{"transaction_id": "tx-001", "notes": "split with Sam"}"#;
        let params: UpdateTransactionParams =
            serde_json::from_str(json).expect("should deserialize");
        assert_eq!(params.transaction_id, "tx-001");
        assert_eq!(params.notes.as_deref(), Some("split with Sam"));
        assert!(params.amount.is_none());
        assert!(params.description.is_none());
        assert!(params.category_id.is_none());
        assert!(params.date.is_none());
        assert!(params.hide_from_reports.is_none());
        assert!(params.needs_review.is_none());
    }

    #[test]
    fn refresh_accounts_optional_filter() {
        let params: RefreshAccountsParams =
            serde_json::from_str(r#"{}"#).expect("should deserialize empty");
        assert!(params.account_ids.is_none());
        let params: RefreshAccountsParams =
            serde_json::from_str(r#"{"account_ids": ["a", "b"]}"#).expect("should deserialize");
        assert_eq!(params.account_ids.map(|ids| ids.len()), Some(2));
    }
}

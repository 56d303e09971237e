//! Typed shapes of Monarch Money GraphQL payloads and mutation inputs.
//!
//! Every field the API may leave out is an `Option` (or carries a serde
//! default) so that a sparse response still deserializes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference to a named entity: category, merchant, institution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct NamedRef {
    /// Entity ID (absent for institutions).
    pub(crate) id: Option<String>,
    /// Display name.
    pub(crate) name: Option<String>,
}

/// Account type or subtype descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct AccountKind {
    /// Machine name, e.g. `depository`.
    pub(crate) name: Option<String>,
    /// Human label, e.g. `Cash`.
    pub(crate) display: Option<String>,
}

/// A financial account.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Account {
    /// Account ID.
    pub(crate) id: String,
    /// Name shown in the Monarch UI.
    pub(crate) display_name: Option<String>,
    /// Current balance.
    pub(crate) current_balance: Option<f64>,
    /// Account type.
    #[serde(rename = "type")]
    pub(crate) kind: Option<AccountKind>,
    /// Account subtype.
    pub(crate) subtype: Option<AccountKind>,
    /// Institution the account is linked to.
    pub(crate) institution: Option<NamedRef>,
    /// Last digits of the account number.
    pub(crate) mask: Option<String>,
    /// Hidden from the UI.
    #[serde(default)]
    pub(crate) is_hidden: bool,
    /// Set when the account was closed.
    pub(crate) deactivated_at: Option<String>,
    /// Last time balances were updated.
    pub(crate) updated_at: Option<String>,
}

/// `GetAccounts` query result.
#[derive(Debug, Deserialize)]
pub(crate) struct AccountList {
    /// All accounts.
    pub(crate) accounts: Vec<Account>,
}

/// Account reference embedded in a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountRef {
    /// Account ID.
    pub(crate) id: String,
    /// Account display name.
    pub(crate) display_name: Option<String>,
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Transaction {
    /// Transaction ID.
    pub(crate) id: String,
    /// Posting date.
    pub(crate) date: NaiveDate,
    /// Signed amount: negative is a debit, positive a credit.
    pub(crate) amount: f64,
    /// Not yet posted by the institution.
    #[serde(default)]
    pub(crate) pending: bool,
    /// Description as received from the institution.
    pub(crate) plaid_name: Option<String>,
    /// User notes.
    pub(crate) notes: Option<String>,
    /// Excluded from reports.
    #[serde(default)]
    pub(crate) hide_from_reports: bool,
    /// Flagged for review.
    #[serde(default)]
    pub(crate) needs_review: bool,
    /// Category.
    pub(crate) category: Option<NamedRef>,
    /// Merchant; its name is the transaction description.
    pub(crate) merchant: Option<NamedRef>,
    /// Owning account.
    pub(crate) account: Option<AccountRef>,
}

/// One page of transactions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionPage {
    /// Number of transactions matching the filters across all pages.
    pub(crate) total_count: Option<u64>,
    /// Transactions on this page.
    pub(crate) results: Vec<Transaction>,
}

/// `GetTransactionsList` query result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionList {
    /// The requested page.
    pub(crate) all_transactions: TransactionPage,
}

/// Filters and paging for a transaction listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TransactionQuery {
    /// Page size.
    pub(crate) limit: u32,
    /// Number of transactions to skip.
    pub(crate) offset: u32,
    /// Inclusive lower date bound.
    pub(crate) start_date: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub(crate) end_date: Option<NaiveDate>,
    /// Restrict to one account.
    pub(crate) account_id: Option<String>,
    /// Restrict to one category.
    pub(crate) category_id: Option<String>,
    /// Free-text search.
    pub(crate) search: Option<String>,
}

/// Planned and actual amounts of one category for one month.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MonthlyAmount {
    /// First day of the month, `YYYY-MM-DD`.
    pub(crate) month: String,
    /// Budgeted amount.
    pub(crate) planned_cash_flow_amount: Option<f64>,
    /// Amount actually spent or earned.
    pub(crate) actual_amount: Option<f64>,
    /// Budget left.
    pub(crate) remaining_amount: Option<f64>,
}

/// Monthly amounts of one category.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CategoryAmounts {
    /// The category (only `id` is populated).
    pub(crate) category: NamedRef,
    /// One entry per month in the requested range.
    pub(crate) monthly_amounts: Vec<MonthlyAmount>,
}

/// Budget amounts for a date range.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BudgetData {
    /// Per-category amounts.
    pub(crate) monthly_amounts_by_category: Vec<CategoryAmounts>,
}

/// A category group and its categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct CategoryGroup {
    /// Group ID.
    pub(crate) id: String,
    /// Group name.
    pub(crate) name: String,
    /// Categories in the group.
    #[serde(default)]
    pub(crate) categories: Vec<NamedRef>,
}

/// `GetJointPlanningData` query result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BudgetPlan {
    /// Amounts.
    pub(crate) budget_data: BudgetData,
    /// Category names and groups.
    #[serde(default)]
    pub(crate) category_groups: Vec<CategoryGroup>,
}

/// Grouping key of a cashflow aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct CashflowGroupBy {
    /// Category the aggregate belongs to.
    pub(crate) category: Option<NamedRef>,
}

/// Sum of one cashflow aggregate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct CashflowSum {
    /// Signed total.
    pub(crate) sum: Option<f64>,
}

/// Cashflow total of one category.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CashflowCategory {
    /// Grouping key.
    pub(crate) group_by: CashflowGroupBy,
    /// Total.
    pub(crate) summary: CashflowSum,
}

/// Income/expense totals for the range.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CashflowTotals {
    /// Total income.
    pub(crate) sum_income: Option<f64>,
    /// Total expense (negative).
    pub(crate) sum_expense: Option<f64>,
    /// Income plus expense.
    pub(crate) savings: Option<f64>,
    /// Savings as a fraction of income.
    pub(crate) savings_rate: Option<f64>,
}

/// Wrapper object around [`CashflowTotals`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct CashflowSummary {
    /// Totals.
    pub(crate) summary: CashflowTotals,
}

/// `Web_GetCashFlowPage` query result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CashflowPage {
    /// Totals per category.
    #[serde(default)]
    pub(crate) by_category: Vec<CashflowCategory>,
    /// Overall totals (one entry).
    #[serde(default)]
    pub(crate) summary: Vec<CashflowSummary>,
}

/// Security held in an investment account.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Security {
    /// Security ID.
    pub(crate) id: Option<String>,
    /// Security name.
    pub(crate) name: Option<String>,
    /// Ticker symbol.
    pub(crate) ticker: Option<String>,
    /// Latest price.
    pub(crate) current_price: Option<f64>,
    /// Kind of security, e.g. `equity`.
    pub(crate) type_display: Option<String>,
}

/// Position in one security, aggregated over the account's lots.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Holding {
    /// Aggregate holding ID.
    pub(crate) id: String,
    /// Number of units.
    pub(crate) quantity: Option<f64>,
    /// Cost basis.
    pub(crate) basis: Option<f64>,
    /// Market value.
    pub(crate) total_value: Option<f64>,
    /// The security.
    pub(crate) security: Option<Security>,
}

/// Connection edge wrapping a [`Holding`].
#[derive(Debug, Deserialize)]
pub(crate) struct HoldingEdge {
    /// The holding.
    pub(crate) node: Holding,
}

/// Holdings connection.
#[derive(Debug, Deserialize)]
pub(crate) struct HoldingConnection {
    /// Edges.
    pub(crate) edges: Vec<HoldingEdge>,
}

/// Portfolio of the requested accounts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Portfolio {
    /// Holdings aggregated per security.
    pub(crate) aggregate_holdings: HoldingConnection,
}

/// `Web_GetHoldings` query result.
#[derive(Debug, Deserialize)]
pub(crate) struct HoldingsData {
    /// Portfolio; absent when the account has no investment data.
    pub(crate) portfolio: Option<Portfolio>,
}

/// Field-level error reported by a mutation.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct FieldError {
    /// Offending input field.
    pub(crate) field: Option<String>,
    /// Error messages.
    #[serde(default)]
    pub(crate) messages: Vec<String>,
}

/// Error object attached to mutation payloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PayloadError {
    /// Summary message.
    pub(crate) message: Option<String>,
    /// Per-field details.
    #[serde(default)]
    pub(crate) field_errors: Vec<FieldError>,
}

impl PayloadError {
    /// Flattens the error into one line, or `None` if it carries nothing.
    pub(crate) fn describe(&self) -> Option<String> {
        let mut parts: Vec<String> = self.message.iter().cloned().collect();
        for field_error in &self.field_errors {
            let field = field_error.field.as_deref().unwrap_or("input");
            parts.extend(
                field_error
                    .messages
                    .iter()
                    .map(|message| format!("{field}: {message}")),
            );
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

/// Payload of the create and update transaction mutations.
#[derive(Debug, Deserialize)]
pub(crate) struct TransactionPayload {
    /// Resulting transaction.
    pub(crate) transaction: Option<Transaction>,
    /// Errors, if the change was rejected.
    pub(crate) errors: Option<PayloadError>,
}

/// `Common_CreateTransactionMutation` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTransactionData {
    /// Payload; `null` when the mutation failed outright.
    pub(crate) create_transaction: Option<TransactionPayload>,
}

/// `Web_TransactionDrawerUpdateTransaction` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateTransactionData {
    /// Payload; `null` when the mutation failed outright.
    pub(crate) update_transaction: Option<TransactionPayload>,
}

/// Payload of the refresh mutation.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshPayload {
    /// Whether the refresh was queued.
    #[serde(default)]
    pub(crate) success: bool,
    /// Errors, if the request was rejected.
    pub(crate) errors: Option<PayloadError>,
}

/// `Common_ForceRefreshAccountsMutation` result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshData {
    /// Payload; `null` when the mutation failed outright.
    pub(crate) force_refresh_accounts: Option<RefreshPayload>,
}

/// Input of the create transaction mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewTransaction {
    /// Posting date.
    pub(crate) date: NaiveDate,
    /// Account to post to.
    pub(crate) account_id: String,
    /// Signed amount in Monarch's convention.
    pub(crate) amount: f64,
    /// Merchant name, used as the description.
    pub(crate) merchant_name: String,
    /// Category.
    pub(crate) category_id: String,
    /// Notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notes: Option<String>,
    /// Adjust the account balance by the amount.
    pub(crate) should_update_balance: bool,
}

/// Input of the update transaction mutation.
///
/// Fields left as `None` are omitted from the request, so the API keeps
/// their current values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransactionUpdate {
    /// Transaction to change.
    pub(crate) id: String,
    /// New amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) amount: Option<f64>,
    /// New merchant name.
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub(crate) merchant_name: Option<String>,
    /// New category ID.
    #[serde(rename = "category", skip_serializing_if = "Option::is_none")]
    pub(crate) category_id: Option<String>,
    /// New date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) date: Option<NaiveDate>,
    /// New notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notes: Option<String>,
    /// Exclude from or include in reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) hide_from_reports: Option<bool>,
    /// Set or clear the review flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) needs_review: Option<bool>,
}

impl TransactionUpdate {
    /// Returns `true` if no field besides the ID is set.
    pub(crate) const fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.merchant_name.is_none()
            && self.category_id.is_none()
            && self.date.is_none()
            && self.notes.is_none()
            && self.hide_from_reports.is_none()
            && self.needs_review.is_none()
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use super::{Account, PayloadError, TransactionList, TransactionUpdate};

    #[test]
    fn account_without_type_or_institution() {
        let json = r#"{"id": "acc-1", "displayName": "Checking", "currentBalance": 12.5}"#;
        let account: Account = serde_json::from_str(json).expect("should deserialize sparse");
        assert_eq!(account.id, "acc-1");
        assert!(account.kind.is_none());
        assert!(account.institution.is_none());
        assert!(!account.is_hidden);
    }

    #[test]
    fn transaction_list_parses_dates_and_refs() {
        let json = r#"{"allTransactions": {"totalCount": 1, "results": [{
            "id": "tx-1",
            "date": "2024-06-15",
            "amount": -42.5,
            "pending": true,
            "merchant": {"id": "m-1", "name": "Coffee Shop"},
            "category": null,
            "account": {"id": "acc-1", "displayName": "Checking"}
        }]}}"#;
        let list: TransactionList = serde_json::from_str(json).expect("should deserialize");
        let page = list.all_transactions;
        assert_eq!(page.total_count, Some(1));
        let tx = page.results.first().expect("one result");
        assert_eq!(tx.date.to_string(), "2024-06-15");
        assert!(tx.pending);
        assert!(tx.category.is_none());
        assert_eq!(
            tx.merchant.as_ref().and_then(|m| m.name.as_deref()),
            Some("Coffee Shop")
        );
    }

    #[test]
    fn update_omits_untouched_fields() {
        let update = TransactionUpdate {
            id: "tx-1".to_owned(),
            notes: Some("lunch".to_owned()),
            ..TransactionUpdate::default()
        };
        let value = serde_json::to_value(&update).expect("should serialize");
        let object = value.as_object().expect("object");
        assert_eq!(object.len(), 2);
        assert_eq!(object.get("notes").and_then(|v| v.as_str()), Some("lunch"));
        assert!(!object.contains_key("amount"));
        assert!(!object.contains_key("category"));
    }

    #[test]
    fn update_with_only_id_is_empty() {
        let update = TransactionUpdate {
            id: "tx-1".to_owned(),
            ..TransactionUpdate::default()
        };
        assert!(update.is_empty());
    }

    #[test]
    fn payload_error_describes_fields() {
        let json = r#"{"message": "Invalid input", "fieldErrors": [
            {"field": "amount", "messages": ["must not be zero"]}
        ]}"#;
        let error: PayloadError = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(
            error.describe().as_deref(),
            Some("Invalid input; amount: must not be zero")
        );
        assert!(PayloadError::default().describe().is_none());
    }
}

//! Response structs for MCP tool outputs.
//!
//! Nested API objects are flattened into plain fields. A field the API did
//! not provide is serialized as `null` rather than omitted, so callers can
//! tell "not applicable" from "empty".

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::collections::btree_map::Entry;
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::monarch::models::{
    Account, BudgetPlan, CashflowPage, Holding, MonthlyAmount, NamedRef, Transaction,
    TransactionPage,
};
use crate::session::CandidateSource;

/// Category key used when the API did not name the category.
const UNCATEGORIZED: &str = "Uncategorized";

/// Name of an optional named reference.
fn ref_name(named: Option<&NamedRef>) -> Option<String> {
    named.and_then(|value| value.name.clone())
}

/// ID of an optional named reference.
fn ref_id(named: Option<&NamedRef>) -> Option<String> {
    named.and_then(|value| value.id.clone())
}

/// Account for display.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AccountResponse {
    /// Account ID.
    pub(crate) id: String,
    /// Display name.
    pub(crate) name: Option<String>,
    /// Account type label.
    #[serde(rename = "type")]
    pub(crate) account_type: Option<String>,
    /// Account subtype label.
    pub(crate) subtype: Option<String>,
    /// Institution name.
    pub(crate) institution: Option<String>,
    /// Current balance.
    pub(crate) balance: Option<f64>,
    /// Last digits of the account number.
    pub(crate) mask: Option<String>,
    /// `false` once the account was closed.
    pub(crate) is_active: bool,
    /// Hidden in the Monarch UI.
    pub(crate) is_hidden: bool,
    /// Last balance update.
    pub(crate) updated_at: Option<String>,
}

impl AccountResponse {
    /// Creates an account response from a raw account.
    pub(crate) fn from_account(account: &Account) -> Self {
        let label = |kind: Option<&crate::monarch::models::AccountKind>| {
            kind.and_then(|value| value.display.clone().or_else(|| value.name.clone()))
        };
        Self {
            id: account.id.clone(),
            name: account.display_name.clone(),
            account_type: label(account.kind.as_ref()),
            subtype: label(account.subtype.as_ref()),
            institution: ref_name(account.institution.as_ref()),
            balance: account.current_balance,
            mask: account.mask.clone(),
            is_active: account.deactivated_at.is_none(),
            is_hidden: account.is_hidden,
            updated_at: account.updated_at.clone(),
        }
    }
}

/// Transaction for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TransactionResponse {
    /// Transaction ID.
    pub(crate) id: String,
    /// Date, `YYYY-MM-DD`.
    pub(crate) date: String,
    /// Signed amount: negative is a debit.
    pub(crate) amount: f64,
    /// Merchant name.
    pub(crate) description: Option<String>,
    /// Description as received from the institution.
    pub(crate) original_description: Option<String>,
    /// Category name.
    pub(crate) category: Option<String>,
    /// Category ID.
    pub(crate) category_id: Option<String>,
    /// Account name.
    pub(crate) account: Option<String>,
    /// Account ID.
    pub(crate) account_id: Option<String>,
    /// User notes.
    pub(crate) notes: Option<String>,
    /// Not yet posted.
    pub(crate) is_pending: bool,
    /// Flagged for review.
    pub(crate) needs_review: bool,
    /// Excluded from reports.
    pub(crate) hide_from_reports: bool,
}

impl TransactionResponse {
    /// Creates a transaction response from a raw transaction.
    pub(crate) fn from_transaction(tx: &Transaction) -> Self {
        Self {
            id: tx.id.clone(),
            date: tx.date.to_string(),
            amount: tx.amount,
            description: ref_name(tx.merchant.as_ref()),
            original_description: tx.plaid_name.clone(),
            category: ref_name(tx.category.as_ref()),
            category_id: ref_id(tx.category.as_ref()),
            account: tx
                .account
                .as_ref()
                .and_then(|account| account.display_name.clone()),
            account_id: tx.account.as_ref().map(|account| account.id.clone()),
            notes: tx.notes.clone(),
            is_pending: tx.pending,
            needs_review: tx.needs_review,
            hide_from_reports: tx.hide_from_reports,
        }
    }
}

/// One page of transactions.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TransactionListResponse {
    /// Matches across all pages.
    pub(crate) total_count: Option<u64>,
    /// Transactions on this page, newest first.
    pub(crate) transactions: Vec<TransactionResponse>,
}

impl TransactionListResponse {
    /// Creates a listing response from a raw page.
    pub(crate) fn from_page(page: &TransactionPage) -> Self {
        Self {
            total_count: page.total_count,
            transactions: page
                .results
                .iter()
                .map(TransactionResponse::from_transaction)
                .collect(),
        }
    }
}

/// Budget figures of one category for one month.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BudgetMonthResponse {
    /// First day of the month.
    month: String,
    /// Budgeted amount.
    planned: Option<f64>,
    /// Actual amount.
    actual: Option<f64>,
    /// Budget left.
    remaining: Option<f64>,
}

impl BudgetMonthResponse {
    /// Creates a month entry from raw amounts.
    fn from_amount(amount: &MonthlyAmount) -> Self {
        Self {
            month: amount.month.clone(),
            planned: amount.planned_cash_flow_amount,
            actual: amount.actual_amount,
            remaining: amount.remaining_amount,
        }
    }
}

/// Budget figures of one category over the requested period.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BudgetCategoryResponse {
    /// Category ID.
    pub(crate) category_id: Option<String>,
    /// Category group name.
    pub(crate) group: Option<String>,
    /// Total budgeted.
    pub(crate) planned: f64,
    /// Total actual.
    pub(crate) actual: f64,
    /// Total remaining.
    pub(crate) remaining: f64,
    /// Per-month breakdown.
    months: Vec<BudgetMonthResponse>,
}

impl BudgetCategoryResponse {
    /// Adds another entry for the same category into this one.
    fn merge(&mut self, other: Self) {
        self.planned += other.planned;
        self.actual += other.actual;
        self.remaining += other.remaining;
        self.months.extend(other.months);
    }
}

/// Budgets keyed by category name.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BudgetsResponse {
    /// First day of the period.
    pub(crate) start_date: String,
    /// Last day of the period.
    pub(crate) end_date: String,
    /// Category name to budget figures.
    pub(crate) categories: BTreeMap<String, BudgetCategoryResponse>,
}

impl BudgetsResponse {
    /// Creates a budget summary, naming categories from the plan's groups.
    pub(crate) fn from_plan(plan: &BudgetPlan, start: NaiveDate, end: NaiveDate) -> Self {
        let mut names: HashMap<&str, (Option<&str>, &str)> = HashMap::new();
        for group in &plan.category_groups {
            for category in &group.categories {
                if let Some(id) = category.id.as_deref() {
                    let _previous =
                        names.insert(id, (category.name.as_deref(), group.name.as_str()));
                }
            }
        }

        let mut categories = BTreeMap::new();
        for entry in &plan.budget_data.monthly_amounts_by_category {
            let id = entry.category.id.as_deref();
            let (name, group) = id
                .and_then(|key| names.get(key).copied())
                .map_or((None, None), |(name, group)| (name, Some(group)));
            let sum = |pick: fn(&MonthlyAmount) -> Option<f64>| {
                entry.monthly_amounts.iter().filter_map(pick).sum::<f64>()
            };
            let response = BudgetCategoryResponse {
                category_id: id.map(str::to_owned),
                group: group.map(str::to_owned),
                planned: sum(|amount| amount.planned_cash_flow_amount),
                actual: sum(|amount| amount.actual_amount),
                remaining: sum(|amount| amount.remaining_amount),
                months: entry
                    .monthly_amounts
                    .iter()
                    .map(BudgetMonthResponse::from_amount)
                    .collect(),
            };
            let mut key = name.or(id).unwrap_or(UNCATEGORIZED).to_owned();
            if categories.contains_key(&key) {
                key = format!("{key} ({})", id.unwrap_or("unknown"));
            }
            match categories.entry(key) {
                Entry::Vacant(slot) => {
                    let _inserted = slot.insert(response);
                }
                Entry::Occupied(mut slot) => {
                    tracing::warn!(category = %slot.key(), "category listed twice in budget data; merging");
                    slot.get_mut().merge(response);
                }
            }
        }

        Self {
            start_date: start.to_string(),
            end_date: end.to_string(),
            categories,
        }
    }
}

/// Income and expense summary.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CashflowResponse {
    /// First day of the period.
    pub(crate) start_date: String,
    /// Last day of the period.
    pub(crate) end_date: String,
    /// Total income.
    pub(crate) income: Option<f64>,
    /// Total expense (negative).
    pub(crate) expense: Option<f64>,
    /// Income plus expense.
    pub(crate) savings: Option<f64>,
    /// Savings as a fraction of income.
    pub(crate) savings_rate: Option<f64>,
    /// Category name to signed total.
    pub(crate) by_category: BTreeMap<String, f64>,
}

impl CashflowResponse {
    /// Creates a cashflow summary from raw aggregates.
    pub(crate) fn from_page(page: &CashflowPage, start: NaiveDate, end: NaiveDate) -> Self {
        let totals = page.summary.first().map(|entry| &entry.summary);
        let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
        for aggregate in &page.by_category {
            let category = aggregate.group_by.category.as_ref();
            let key = ref_name(category)
                .or_else(|| ref_id(category))
                .unwrap_or_else(|| UNCATEGORIZED.to_owned());
            *by_category.entry(key).or_insert(0.0) += aggregate.summary.sum.unwrap_or_default();
        }
        Self {
            start_date: start.to_string(),
            end_date: end.to_string(),
            income: totals.and_then(|summary| summary.sum_income),
            expense: totals.and_then(|summary| summary.sum_expense),
            savings: totals.and_then(|summary| summary.savings),
            savings_rate: totals.and_then(|summary| summary.savings_rate),
            by_category,
        }
    }
}

/// Investment holding for display.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct HoldingResponse {
    /// Holding ID.
    id: String,
    /// Security name.
    name: Option<String>,
    /// Ticker symbol.
    ticker: Option<String>,
    /// Kind of security.
    security_type: Option<String>,
    /// Units held.
    quantity: Option<f64>,
    /// Latest price per unit.
    current_price: Option<f64>,
    /// Cost basis.
    basis: Option<f64>,
    /// Market value.
    total_value: Option<f64>,
}

impl HoldingResponse {
    /// Creates a holding response from a raw holding.
    pub(crate) fn from_holding(holding: &Holding) -> Self {
        let security = holding.security.as_ref();
        Self {
            id: holding.id.clone(),
            name: security.and_then(|sec| sec.name.clone()),
            ticker: security.and_then(|sec| sec.ticker.clone()),
            security_type: security.and_then(|sec| sec.type_display.clone()),
            quantity: holding.quantity,
            current_price: security.and_then(|sec| sec.current_price),
            basis: holding.basis,
            total_value: holding.total_value,
        }
    }
}

/// Acknowledgement of a refresh request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshResponse {
    /// Whether Monarch queued the refresh.
    pub(crate) requested: bool,
    /// Accounts included in the request.
    pub(crate) account_ids: Vec<String>,
    /// Human-readable status.
    pub(crate) message: String,
}

impl RefreshResponse {
    /// Acknowledgement when there are no accounts to refresh.
    pub(crate) fn nothing_to_refresh() -> Self {
        Self {
            requested: false,
            account_ids: Vec::new(),
            message: "There are no accounts to refresh".to_owned(),
        }
    }

    /// Creates a refresh acknowledgement.
    pub(crate) fn new(requested: bool, account_ids: Vec<String>) -> Self {
        let message = if requested {
            format!(
                "Refresh requested for {} account(s); balances and transactions update in the background",
                account_ids.len()
            )
        } else {
            "Monarch Money did not accept the refresh request".to_owned()
        };
        Self {
            requested,
            account_ids,
            message,
        }
    }
}

/// One session file location and whether it holds a usable file.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionCandidateResponse {
    /// Path checked.
    pub(crate) path: String,
    /// Where the path came from.
    pub(crate) source: CandidateSource,
    /// Non-empty file present.
    pub(crate) found: bool,
}

/// Result of `check_auth_status`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuthStatusResponse {
    /// A working client handle is available.
    pub(crate) authenticated: bool,
    /// `authenticated`, `session_expired`, or `auth_failed`.
    pub(crate) state: &'static str,
    /// `session_file` or `credentials`.
    pub(crate) auth_source: Option<&'static str>,
    /// Session file resolved at startup.
    pub(crate) session_path: Option<String>,
    /// Failure reason or remediation hint.
    pub(crate) detail: Option<String>,
    /// Every location checked for a session file.
    pub(crate) session_candidates: Vec<SessionCandidateResponse>,
    /// Email configured in the environment.
    pub(crate) environment_email: Option<String>,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::float_cmp,
    clippy::missing_docs_in_private_items,
    reason = "test code compares exact fixture values and uses expect for readability"
)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::Value;

    use super::{AccountResponse, BudgetsResponse, CashflowResponse, TransactionResponse};
    use crate::monarch::fake;
    use crate::monarch::models::{
        Account, BudgetData, BudgetPlan, CashflowCategory, CashflowGroupBy, CashflowPage,
        CashflowSum, CashflowSummary, CashflowTotals, CategoryAmounts, CategoryGroup,
        MonthlyAmount, NamedRef,
    };

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").expect("valid date for test")
    }

    fn named(id: &str, name: &str) -> NamedRef {
        NamedRef {
            id: Some(id.to_owned()),
            name: Some(name.to_owned()),
        }
    }

    #[test]
    fn missing_type_and_institution_serialize_as_null() {
        let account = Account {
            id: "acc-1".to_owned(),
            display_name: Some("Cash Stash".to_owned()),
            current_balance: Some(10.0),
            ..Account::default()
        };
        let value = serde_json::to_value(AccountResponse::from_account(&account))
            .expect("should serialize");
        let object = value.as_object().expect("object");
        assert_eq!(object.get("type"), Some(&Value::Null));
        assert_eq!(object.get("institution"), Some(&Value::Null));
        assert_eq!(object.get("name").and_then(Value::as_str), Some("Cash Stash"));
        assert_eq!(object.get("is_active"), Some(&Value::Bool(true)));
    }

    #[test]
    fn account_prefers_display_label() {
        let resp = AccountResponse::from_account(&fake::account("acc-1", "Checking"));
        assert_eq!(resp.account_type.as_deref(), Some("Cash"));
        assert_eq!(resp.institution.as_deref(), Some("Test Bank"));
    }

    #[test]
    fn transaction_flattens_references() {
        let tx = fake::transaction("tx-1", "acc-1", date("2024-06-15"), -4.5, "Coffee Shop");
        let resp = TransactionResponse::from_transaction(&tx);
        assert_eq!(resp.date, "2024-06-15");
        assert_eq!(resp.description.as_deref(), Some("Coffee Shop"));
        assert_eq!(resp.original_description.as_deref(), Some("COFFEE SHOP"));
        assert_eq!(resp.category.as_deref(), Some("Groceries"));
        assert_eq!(resp.account_id.as_deref(), Some("acc-1"));
        assert!(resp.account.is_none());
        let value = serde_json::to_value(&resp).expect("should serialize");
        assert_eq!(value.get("notes"), Some(&Value::Null));
    }

    #[test]
    fn budgets_keyed_by_category_name() {
        let plan = BudgetPlan {
            budget_data: BudgetData {
                monthly_amounts_by_category: vec![
                    CategoryAmounts {
                        category: NamedRef {
                            id: Some("cat-1".to_owned()),
                            name: None,
                        },
                        monthly_amounts: vec![
                            MonthlyAmount {
                                month: "2024-05-01".to_owned(),
                                planned_cash_flow_amount: Some(400.0),
                                actual_amount: Some(350.0),
                                remaining_amount: Some(50.0),
                            },
                            MonthlyAmount {
                                month: "2024-06-01".to_owned(),
                                planned_cash_flow_amount: Some(400.0),
                                actual_amount: None,
                                remaining_amount: Some(400.0),
                            },
                        ],
                    },
                    CategoryAmounts {
                        category: NamedRef {
                            id: Some("cat-unknown".to_owned()),
                            name: None,
                        },
                        monthly_amounts: Vec::new(),
                    },
                ],
            },
            category_groups: vec![CategoryGroup {
                id: "grp-1".to_owned(),
                name: "Food".to_owned(),
                categories: vec![named("cat-1", "Groceries")],
            }],
        };
        let resp = BudgetsResponse::from_plan(&plan, date("2024-05-01"), date("2024-06-30"));
        let groceries = resp.categories.get("Groceries").expect("named category");
        assert_eq!(groceries.group.as_deref(), Some("Food"));
        assert_eq!(groceries.planned, 800.0);
        assert_eq!(groceries.actual, 350.0);
        assert_eq!(groceries.remaining, 450.0);
        assert!(resp.categories.contains_key("cat-unknown"));
        assert_eq!(resp.start_date, "2024-05-01");
    }

    #[test]
    fn repeated_category_is_merged() {
        let amounts = |planned: f64| CategoryAmounts {
            category: NamedRef {
                id: Some("cat-1".to_owned()),
                name: None,
            },
            monthly_amounts: vec![MonthlyAmount {
                month: "2024-06-01".to_owned(),
                planned_cash_flow_amount: Some(planned),
                actual_amount: Some(10.0),
                remaining_amount: None,
            }],
        };
        let plan = BudgetPlan {
            budget_data: BudgetData {
                monthly_amounts_by_category: vec![amounts(100.0), amounts(50.0), amounts(25.0)],
            },
            category_groups: vec![CategoryGroup {
                id: "grp-1".to_owned(),
                name: "Food".to_owned(),
                categories: vec![named("cat-1", "Groceries")],
            }],
        };
        let resp = BudgetsResponse::from_plan(&plan, date("2024-06-01"), date("2024-06-30"));
        assert_eq!(resp.categories.len(), 2);
        let first = resp.categories.get("Groceries").expect("first entry");
        assert_eq!(first.planned, 100.0);
        let merged = resp
            .categories
            .get("Groceries (cat-1)")
            .expect("later entries merged");
        assert_eq!(merged.planned, 75.0);
        assert_eq!(merged.actual, 20.0);
        assert_eq!(merged.months.len(), 2);
    }

    #[test]
    fn cashflow_sums_by_category() {
        let page = CashflowPage {
            by_category: vec![
                CashflowCategory {
                    group_by: CashflowGroupBy {
                        category: Some(named("cat-1", "Groceries")),
                    },
                    summary: CashflowSum { sum: Some(-120.0) },
                },
                CashflowCategory {
                    group_by: CashflowGroupBy {
                        category: Some(named("cat-2", "Paycheck")),
                    },
                    summary: CashflowSum { sum: Some(3_000.0) },
                },
            ],
            summary: vec![CashflowSummary {
                summary: CashflowTotals {
                    sum_income: Some(3_000.0),
                    sum_expense: Some(-120.0),
                    savings: Some(2_880.0),
                    savings_rate: Some(0.96),
                },
            }],
        };
        let resp = CashflowResponse::from_page(&page, date("2024-06-01"), date("2024-06-30"));
        assert_eq!(resp.income, Some(3_000.0));
        assert_eq!(resp.expense, Some(-120.0));
        assert_eq!(resp.by_category.get("Groceries"), Some(&-120.0));
        assert_eq!(resp.by_category.len(), 2);
    }

    #[test]
    fn empty_cashflow_reports_nulls() {
        let resp = CashflowResponse::from_page(
            &CashflowPage::default(),
            date("2024-06-01"),
            date("2024-06-30"),
        );
        let value = serde_json::to_value(&resp).expect("should serialize");
        assert_eq!(value.get("income"), Some(&Value::Null));
        assert_eq!(value.get("savings_rate"), Some(&Value::Null));
    }
}

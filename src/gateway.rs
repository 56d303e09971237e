//! Tool operations over the shared Monarch client handle.
//!
//! Arguments are validated first, then the API call is submitted to the
//! [`WorkerPool`] and only the calling tool waits for it. Results are
//! converted into response structs; failures into [`ToolError`].

extern crate alloc;

use alloc::sync::Arc;
use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};

use chrono::{Datelike, Local, Months, NaiveDate};

use crate::auth::{AuthSource, AuthState, REMEDIATION, Startup};
use crate::error::ToolError;
use crate::monarch::models::{NewTransaction, TransactionQuery, TransactionUpdate};
use crate::monarch::{MonarchApi, MonarchError};
use crate::params::{
    CreateTransactionParams, GetAccountHoldingsParams, GetBudgetsParams, GetCashflowParams,
    GetTransactionsParams, RefreshAccountsParams, UpdateTransactionParams,
};
use crate::pool::WorkerPool;
use crate::response::{
    AccountResponse, AuthStatusResponse, BudgetsResponse, CashflowResponse, HoldingResponse,
    RefreshResponse, SessionCandidateResponse, TransactionListResponse, TransactionResponse,
};

/// Page size when `limit` is not given.
pub(crate) const DEFAULT_TRANSACTION_LIMIT: u32 = 100;
/// Largest page size; bigger requests are clamped.
pub(crate) const MAX_TRANSACTION_LIMIT: u32 = 1_000;

/// Text returned by `setup_authentication`.
pub(crate) const SETUP_INSTRUCTIONS: &str = "\
Monarch Money - one-time setup

1. Log in once and save a session file:
     MONARCH_EMAIL=you@example.com MONARCH_PASSWORD=... monarch-mcp login
   If your account uses two-factor authentication, add --mfa-code <code>,
   or set MONARCH_MFA_SECRET to your base32 TOTP secret.

2. The session is saved to ./monarch_session.json, ./.mm/mm_session.pickle
   and ~/.mm/mm_session.pickle (or only to MONARCH_SESSION_FILE if set).
   The server checks those paths in the order MONARCH_SESSION_FILE,
   project root, project .mm directory, home .mm directory.

3. Restart the MCP server. It loads the first non-empty session file it
   finds; if none loads, it logs in with MONARCH_EMAIL/MONARCH_PASSWORD
   when they are set.

4. Call check_auth_status to confirm, then use get_accounts,
   get_transactions, get_budgets, get_cashflow and the other tools.

Sessions last for weeks. When one expires, repeat step 1 and restart.";

/// Parses a `YYYY-MM-DD` argument.
fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| ToolError::invalid(field, format!("'{value}' is not a YYYY-MM-DD date: {err}")))
}

/// Parses an optional date range whose bounds must be given together.
fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(NaiveDate, NaiveDate)>, ToolError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ToolError::invalid(
            "end_date",
            "required when start_date is given",
        )),
        (None, Some(_)) => Err(ToolError::invalid(
            "start_date",
            "required when end_date is given",
        )),
        (Some(start_text), Some(end_text)) => {
            let first = parse_date("start_date", start_text)?;
            let last = parse_date("end_date", end_text)?;
            if first > last {
                return Err(ToolError::invalid(
                    "start_date",
                    format!("{first} is after end_date {last}"),
                ));
            }
            Ok(Some((first, last)))
        }
    }
}

/// First and last day of the month containing `day`.
fn month_bounds(day: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let first = day.with_day(1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}

/// Parses a `YYYY-MM` argument into the month's first and last day.
fn parse_month(value: &str) -> Result<(NaiveDate, NaiveDate), ToolError> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .map_err(|err| ToolError::invalid("month", format!("'{value}' is not a YYYY-MM month: {err}")))?;
    month_bounds(first).ok_or_else(|| ToolError::invalid("month", format!("'{value}' is out of range")))
}

/// Default budget period: start of last month to end of next month.
fn default_budget_range(today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let (previous_first, _) = month_bounds(today.checked_sub_months(Months::new(1))?)?;
    let (_, next_last) = month_bounds(today.checked_add_months(Months::new(1))?)?;
    Some((previous_first, next_last))
}

/// Clamps a requested page size into `1..=MAX_TRANSACTION_LIMIT`.
fn clamp_limit(limit: Option<i64>) -> u32 {
    limit.map_or(DEFAULT_TRANSACTION_LIMIT, |requested| {
        u32::try_from(requested.clamp(1, i64::from(MAX_TRANSACTION_LIMIT)))
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
    })
}

/// Clamps a requested offset into `0..=u32::MAX`.
fn clamp_offset(offset: Option<i64>) -> u32 {
    offset.map_or(0, |requested| {
        u32::try_from(requested.clamp(0, i64::from(u32::MAX))).unwrap_or(u32::MAX)
    })
}

/// Trims a required string argument, rejecting blanks.
fn required(field: &'static str, value: &str) -> Result<String, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_owned())
}

/// Trims an optional string argument; blanks count as absent.
fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Rejects NaN and infinite amounts.
fn finite_amount(field: &'static str, amount: f64) -> Result<f64, ToolError> {
    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(ToolError::invalid(field, "must be a finite number"))
    }
}

/// Owns the client handle and runs every tool operation.
#[derive(Debug)]
pub(crate) struct Gateway {
    /// Startup outcome, including the client handle when authenticated.
    startup: Startup,
    /// Set once the API rejects the token; cleared only by a restart.
    expired: AtomicBool,
    /// Runs API calls off the dispatch path.
    pool: WorkerPool,
}

impl Gateway {
    /// Creates a gateway from the startup outcome.
    pub(crate) const fn new(startup: Startup, pool: WorkerPool) -> Self {
        Self {
            startup,
            expired: AtomicBool::new(false),
            pool,
        }
    }

    /// Returns the client handle, or the reason it cannot be used.
    fn client(&self) -> Result<Arc<dyn MonarchApi>, ToolError> {
        match self.startup.state {
            AuthState::Failed { ref reason } => Err(ToolError::NotAuthenticated {
                reason: reason.clone(),
            }),
            AuthState::Authenticated { ref client, .. } => {
                if self.expired.load(Ordering::Acquire) {
                    return Err(ToolError::SessionExpired);
                }
                Ok(Arc::clone(client))
            }
        }
    }

    /// Runs one API operation on the worker pool.
    async fn call<T, F, Fut>(&self, context: &'static str, operation: F) -> Result<T, ToolError>
    where
        F: FnOnce(Arc<dyn MonarchApi>) -> Fut,
        Fut: Future<Output = Result<T, MonarchError>> + Send + 'static,
        T: Send + 'static,
    {
        let client = self.client()?;
        let outcome = self.pool.run(operation(client)).await.map_err(|err| {
            tracing::error!(%err, context, "worker task failed");
            ToolError::Internal(context)
        })?;
        outcome.map_err(|source| {
            if source.is_session_expired() {
                self.expired.store(true, Ordering::Release);
                tracing::warn!(context, "Monarch Money rejected the session token");
                return ToolError::SessionExpired;
            }
            ToolError::Api { context, source }
        })
    }

    /// Reports authentication state without touching the API.
    pub(crate) fn auth_status(&self) -> AuthStatusResponse {
        let expired = self.expired.load(Ordering::Acquire);
        let (authenticated, state, auth_source, detail) = match self.startup.state {
            AuthState::Authenticated { ref source, .. } => {
                let source_label = match *source {
                    AuthSource::SessionFile(_) => "session_file",
                    AuthSource::Credentials => "credentials",
                };
                if expired {
                    (
                        false,
                        "session_expired",
                        Some(source_label),
                        Some(REMEDIATION.to_owned()),
                    )
                } else {
                    (true, "authenticated", Some(source_label), None)
                }
            }
            AuthState::Failed { ref reason } => (
                false,
                "auth_failed",
                None,
                Some(format!("{reason}. {REMEDIATION}")),
            ),
        };
        let session_candidates = self
            .startup
            .locations
            .candidates()
            .iter()
            .map(|candidate| SessionCandidateResponse {
                path: candidate.path.display().to_string(),
                source: candidate.source,
                found: candidate.is_usable(),
            })
            .collect();
        AuthStatusResponse {
            authenticated,
            state,
            auth_source,
            session_path: self
                .startup
                .session_path
                .as_ref()
                .map(|path| path.display().to_string()),
            detail,
            session_candidates,
            environment_email: self.startup.email.clone(),
        }
    }

    /// `get_accounts`.
    pub(crate) async fn accounts(&self) -> Result<Vec<AccountResponse>, ToolError> {
        let accounts = self
            .call("failed to fetch accounts", |client| async move {
                client.accounts().await
            })
            .await?;
        Ok(accounts.iter().map(AccountResponse::from_account).collect())
    }

    /// `get_transactions`.
    pub(crate) async fn transactions(
        &self,
        params: GetTransactionsParams,
    ) -> Result<TransactionListResponse, ToolError> {
        let range = parse_range(params.start_date.as_deref(), params.end_date.as_deref())?;
        let query = TransactionQuery {
            limit: clamp_limit(params.limit),
            offset: clamp_offset(params.offset),
            start_date: range.map(|(start, _)| start),
            end_date: range.map(|(_, end)| end),
            account_id: optional(params.account_id.as_deref()),
            category_id: optional(params.category_id.as_deref()),
            search: optional(params.search.as_deref()),
        };
        let page = self
            .call("failed to fetch transactions", |client| async move {
                client.transactions(&query).await
            })
            .await?;
        Ok(TransactionListResponse::from_page(&page))
    }

    /// `get_budgets`.
    pub(crate) async fn budgets(
        &self,
        params: GetBudgetsParams,
    ) -> Result<BudgetsResponse, ToolError> {
        let (start, end) = match params.month.as_deref() {
            Some(month) => parse_month(month)?,
            None => default_budget_range(Local::now().date_naive())
                .ok_or(ToolError::Internal("computing the default budget period"))?,
        };
        let plan = self
            .call("failed to fetch budgets", move |client| async move {
                client.budgets(start, end).await
            })
            .await?;
        Ok(BudgetsResponse::from_plan(&plan, start, end))
    }

    /// `get_cashflow`.
    pub(crate) async fn cashflow(
        &self,
        params: GetCashflowParams,
    ) -> Result<CashflowResponse, ToolError> {
        let range = parse_range(params.start_date.as_deref(), params.end_date.as_deref())?;
        let (start, end) = match range {
            Some(bounds) => bounds,
            None => month_bounds(Local::now().date_naive())
                .ok_or(ToolError::Internal("computing the current month"))?,
        };
        let page = self
            .call("failed to fetch cashflow", move |client| async move {
                client.cashflow(start, end).await
            })
            .await?;
        Ok(CashflowResponse::from_page(&page, start, end))
    }

    /// `get_account_holdings`.
    pub(crate) async fn holdings(
        &self,
        params: GetAccountHoldingsParams,
    ) -> Result<Vec<HoldingResponse>, ToolError> {
        let account_id = required("account_id", &params.account_id)?;
        let holdings = self
            .call("failed to fetch account holdings", |client| async move {
                client.holdings(&account_id).await
            })
            .await?;
        Ok(holdings.iter().map(HoldingResponse::from_holding).collect())
    }

    /// `create_transaction`.
    pub(crate) async fn create_transaction(
        &self,
        params: CreateTransactionParams,
    ) -> Result<TransactionResponse, ToolError> {
        let input = NewTransaction {
            date: parse_date("date", &params.date)?,
            account_id: required("account_id", &params.account_id)?,
            amount: finite_amount("amount", params.amount)?,
            merchant_name: required("description", &params.description)?,
            category_id: required("category_id", &params.category_id)?,
            notes: optional(params.notes.as_deref()),
            should_update_balance: params.update_balance,
        };
        let created = self
            .call("failed to create transaction", |client| async move {
                client.create_transaction(&input).await
            })
            .await?;
        tracing::info!(id = %created.id, "transaction created");
        Ok(TransactionResponse::from_transaction(&created))
    }

    /// `update_transaction`.
    pub(crate) async fn update_transaction(
        &self,
        params: UpdateTransactionParams,
    ) -> Result<TransactionResponse, ToolError> {
        let update = TransactionUpdate {
            id: required("transaction_id", &params.transaction_id)?,
            amount: params
                .amount
                .map(|amount| finite_amount("amount", amount))
                .transpose()?,
            merchant_name: params
                .description
                .as_deref()
                .map(|text| required("description", text))
                .transpose()?,
            category_id: params
                .category_id
                .as_deref()
                .map(|id| required("category_id", id))
                .transpose()?,
            date: params
                .date
                .as_deref()
                .map(|text| parse_date("date", text))
                .transpose()?,
            notes: params.notes,
            hide_from_reports: params.hide_from_reports,
            needs_review: params.needs_review,
        };
        if update.is_empty() {
            return Err(ToolError::invalid(
                "transaction_id",
                "no fields to update were given",
            ));
        }
        let updated = self
            .call("failed to update transaction", |client| async move {
                client.update_transaction(&update).await
            })
            .await?;
        tracing::info!(id = %updated.id, "transaction updated");
        Ok(TransactionResponse::from_transaction(&updated))
    }

    /// `refresh_accounts`. Returns as soon as the refresh is queued.
    pub(crate) async fn refresh_accounts(
        &self,
        params: RefreshAccountsParams,
    ) -> Result<RefreshResponse, ToolError> {
        let requested_ids: Option<Vec<String>> = params.account_ids.map(|ids| {
            ids.iter()
                .filter_map(|id| optional(Some(id.as_str())))
                .collect()
        });
        let account_ids = match requested_ids {
            Some(ids) if !ids.is_empty() => ids,
            Some(_) => return Err(ToolError::invalid("account_ids", "must not be empty")),
            None => self
                .call("failed to list accounts to refresh", |client| async move {
                    client.accounts().await
                })
                .await?
                .into_iter()
                .map(|account| account.id)
                .collect(),
        };
        if account_ids.is_empty() {
            return Ok(RefreshResponse::nothing_to_refresh());
        }
        let ids = account_ids.clone();
        let requested = self
            .call("failed to request account refresh", |client| async move {
                client.request_refresh(&ids).await
            })
            .await?;
        Ok(RefreshResponse::new(requested, account_ids))
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::float_cmp,
    clippy::missing_docs_in_private_items,
    reason = "test code compares exact fixture values and uses expect for readability"
)]
mod tests {
    extern crate alloc;

    use alloc::sync::Arc;
    use core::time::Duration;
    use std::fs;
    use std::path::{Path, PathBuf};

    use chrono::NaiveDate;
    use tokio::sync::Barrier;

    use super::{
        Gateway, SETUP_INSTRUCTIONS, clamp_limit, clamp_offset, default_budget_range,
        parse_month, parse_range,
    };
    use crate::auth::{AuthSource, AuthState, Startup};
    use crate::error::ToolError;
    use crate::monarch::MonarchApi;
    use crate::monarch::fake::{self, FakeMonarch};
    use crate::monarch::models::{
        Account, BudgetData, BudgetPlan, CashflowCategory, CashflowGroupBy, CashflowPage,
        CashflowSum, CategoryAmounts, Holding, MonthlyAmount, NamedRef, Security,
    };
    use crate::params::{
        CreateTransactionParams, GetAccountHoldingsParams, GetBudgetsParams, GetCashflowParams,
        GetTransactionsParams, RefreshAccountsParams, UpdateTransactionParams,
    };
    use crate::pool::WorkerPool;
    use crate::session::SessionLocations;

    fn date(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").expect("valid date for test")
    }

    fn authenticated(api: Arc<FakeMonarch>, pool_size: usize) -> Gateway {
        let client: Arc<dyn MonarchApi> = api;
        let path = PathBuf::from("/nonexistent/monarch_session.json");
        Gateway::new(
            Startup {
                state: AuthState::Authenticated {
                    client,
                    source: AuthSource::SessionFile(path.clone()),
                },
                session_path: Some(path),
                locations: SessionLocations::new(None, Path::new("/nonexistent"), None),
                email: None,
            },
            WorkerPool::new(pool_size),
        )
    }

    fn degraded(project: &Path) -> Gateway {
        Gateway::new(
            Startup {
                state: AuthState::Failed {
                    reason: "no session file found, and MONARCH_EMAIL/MONARCH_PASSWORD are not set"
                        .to_owned(),
                },
                session_path: None,
                locations: SessionLocations::new(None, project, None),
                email: None,
            },
            WorkerPool::new(2),
        )
    }

    fn seeded() -> Arc<FakeMonarch> {
        Arc::new(
            FakeMonarch::new()
                .with_account(fake::account("acc-1", "Checking"))
                .with_account(fake::account("acc-2", "Savings"))
                .with_transaction(fake::transaction(
                    "tx-1",
                    "acc-1",
                    date("2024-06-01"),
                    -25.0,
                    "Grocer",
                ))
                .with_transaction(fake::transaction(
                    "tx-2",
                    "acc-1",
                    date("2024-06-10"),
                    -8.0,
                    "Cafe",
                ))
                .with_transaction(fake::transaction(
                    "tx-3",
                    "acc-2",
                    date("2024-06-12"),
                    2_000.0,
                    "Employer",
                )),
        )
    }

    fn create_params(date_text: &str) -> CreateTransactionParams {
        CreateTransactionParams {
            account_id: "acc-2".to_owned(),
            amount: -42.25,
            date: date_text.to_owned(),
            description: "Hardware Store".to_owned(),
            category_id: "cat-home".to_owned(),
            notes: None,
            update_balance: false,
        }
    }

    #[tokio::test]
    async fn accounts_mark_missing_fields_as_null() {
        let api = Arc::new(FakeMonarch::new().with_account(Account {
            id: "acc-manual".to_owned(),
            display_name: Some("Envelope".to_owned()),
            ..Account::default()
        }));
        let gateway = authenticated(api, 2);
        let accounts = gateway.accounts().await.expect("accounts");
        let value = serde_json::to_value(&accounts).expect("serialize");
        let first = value
            .as_array()
            .and_then(|items| items.first())
            .and_then(serde_json::Value::as_object)
            .expect("one account object");
        assert_eq!(first.get("type"), Some(&serde_json::Value::Null));
        assert_eq!(first.get("institution"), Some(&serde_json::Value::Null));
    }

    #[tokio::test]
    async fn degraded_mode_reports_status_and_remediation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = degraded(dir.path());

        let status = gateway.auth_status();
        assert!(!status.authenticated);
        assert_eq!(status.state, "auth_failed");
        assert!(status.session_path.is_none());
        assert!(status.session_candidates.iter().all(|candidate| !candidate.found));

        let err = gateway.accounts().await.expect_err("no client");
        assert!(matches!(err, ToolError::NotAuthenticated { .. }));
        assert!(err.to_string().contains("monarch-mcp login"));

        let err = gateway
            .transactions(GetTransactionsParams::default())
            .await
            .expect_err("no client");
        assert!(err.to_string().contains("monarch-mcp login"));

        assert!(SETUP_INSTRUCTIONS.contains("monarch-mcp login"));
        assert!(!gateway.auth_status().authenticated);
    }

    #[tokio::test]
    async fn status_lists_found_candidates() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("monarch_session.json"), b"{}").expect("write");
        let status = degraded(dir.path()).auth_status();
        let found: Vec<bool> = status
            .session_candidates
            .iter()
            .map(|candidate| candidate.found)
            .collect();
        assert_eq!(found, vec![true, false]);
    }

    #[tokio::test]
    async fn authenticated_status_names_session_file() {
        let gateway = authenticated(seeded(), 2);
        let status = gateway.auth_status();
        assert!(status.authenticated);
        assert_eq!(status.auth_source, Some("session_file"));
        assert_eq!(
            status.session_path.as_deref(),
            Some("/nonexistent/monarch_session.json")
        );
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let api = seeded();
        let gateway = authenticated(Arc::clone(&api), 2);
        let created = gateway
            .create_transaction(create_params("2024-06-20"))
            .await
            .expect("create");
        assert_eq!(created.amount, -42.25);

        let listed = gateway
            .transactions(GetTransactionsParams {
                start_date: Some("2024-06-20".to_owned()),
                end_date: Some("2024-06-20".to_owned()),
                account_id: Some("acc-2".to_owned()),
                ..GetTransactionsParams::default()
            })
            .await
            .expect("list");
        let found = listed
            .transactions
            .iter()
            .find(|tx| tx.id == created.id)
            .expect("created transaction is listed");
        assert_eq!(found.amount, -42.25);
        assert_eq!(found.description.as_deref(), Some("Hardware Store"));
        assert_eq!(listed.total_count, Some(1));
    }

    #[tokio::test]
    async fn create_passes_api_errors_through() {
        let gateway = authenticated(seeded(), 2);
        let mut params = create_params("2024-06-20");
        params.account_id = "acc-missing".to_owned();
        let err = gateway
            .create_transaction(params)
            .await
            .expect_err("unknown account");
        let message = err.to_string();
        assert!(message.starts_with("failed to create transaction"));
        assert!(message.contains("account acc-missing not found"));
    }

    #[tokio::test]
    async fn single_field_update_preserves_the_rest() {
        let gateway = authenticated(seeded(), 2);
        let before = gateway
            .transactions(GetTransactionsParams {
                account_id: Some("acc-1".to_owned()),
                ..GetTransactionsParams::default()
            })
            .await
            .expect("list")
            .transactions
            .into_iter()
            .find(|tx| tx.id == "tx-1")
            .expect("tx-1");

        let after = gateway
            .update_transaction(UpdateTransactionParams {
                transaction_id: "tx-1".to_owned(),
                notes: Some("weekly shop".to_owned()),
                ..UpdateTransactionParams::default()
            })
            .await
            .expect("update");

        assert_eq!(after.notes.as_deref(), Some("weekly shop"));
        let mut expected = before;
        expected.notes = Some("weekly shop".to_owned());
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn update_without_fields_is_rejected_before_any_call() {
        let api = seeded();
        let gateway = authenticated(Arc::clone(&api), 2);
        let err = gateway
            .update_transaction(UpdateTransactionParams {
                transaction_id: "tx-1".to_owned(),
                ..UpdateTransactionParams::default()
            })
            .await
            .expect_err("nothing to update");
        assert!(err.is_validation());
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_date_is_rejected_before_any_call() {
        let api = seeded();
        let gateway = authenticated(Arc::clone(&api), 2);
        let err = gateway
            .create_transaction(create_params("20-06-2024"))
            .await
            .expect_err("bad date");
        assert!(err.is_validation());
        assert!(err.to_string().contains("`date`"));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn limit_is_clamped_not_rejected() {
        let gateway = authenticated(seeded(), 2);
        let page = gateway
            .transactions(GetTransactionsParams {
                limit: Some(0),
                ..GetTransactionsParams::default()
            })
            .await
            .expect("clamped to one");
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions.first().map(|tx| tx.id.as_str()), Some("tx-3"));

        let page = gateway
            .transactions(GetTransactionsParams {
                limit: Some(50_000),
                offset: Some(-3),
                ..GetTransactionsParams::default()
            })
            .await
            .expect("clamped to max");
        assert_eq!(page.transactions.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reads_run_in_parallel() {
        let barrier = Arc::new(Barrier::new(2));
        let api = Arc::new(
            FakeMonarch::new()
                .with_transaction(fake::transaction("a", "acc-1", date("2024-01-01"), -1.0, "A"))
                .with_transaction(fake::transaction("b", "acc-2", date("2024-01-02"), -2.0, "B"))
                .with_rendezvous(barrier),
        );
        let gateway = authenticated(api, 2);
        let first = gateway.transactions(GetTransactionsParams {
            account_id: Some("acc-1".to_owned()),
            ..GetTransactionsParams::default()
        });
        let second = gateway.transactions(GetTransactionsParams {
            account_id: Some("acc-2".to_owned()),
            ..GetTransactionsParams::default()
        });
        let (left, right) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(first, second)
        })
        .await
        .expect("both calls finish without waiting on each other");
        let left_page = left.expect("first listing");
        let right_page = right.expect("second listing");
        assert_eq!(left_page.transactions.first().map(|tx| tx.id.as_str()), Some("a"));
        assert_eq!(right_page.transactions.first().map(|tx| tx.id.as_str()), Some("b"));
    }

    #[tokio::test]
    async fn expired_session_sticks_until_restart() {
        let api = seeded();
        let gateway = authenticated(Arc::clone(&api), 2);
        api.expire();

        let err = gateway.accounts().await.expect_err("expired");
        assert!(matches!(err, ToolError::SessionExpired));
        assert!(err.to_string().contains("monarch-mcp login"));
        let calls_after_expiry = api.calls();

        let err = gateway
            .transactions(GetTransactionsParams::default())
            .await
            .expect_err("still expired");
        assert!(matches!(err, ToolError::SessionExpired));
        assert_eq!(api.calls(), calls_after_expiry);

        let status = gateway.auth_status();
        assert!(!status.authenticated);
        assert_eq!(status.state, "session_expired");
    }

    #[tokio::test]
    async fn holdings_for_unknown_account_fail() {
        let api = Arc::new(
            FakeMonarch::new().with_holdings(
                "acc-invest",
                vec![Holding {
                    id: "h-1".to_owned(),
                    quantity: Some(10.0),
                    basis: Some(900.0),
                    total_value: Some(1_000.0),
                    security: Some(Security {
                        name: Some("Index Fund".to_owned()),
                        ticker: Some("IDX".to_owned()),
                        current_price: Some(100.0),
                        ..Security::default()
                    }),
                }],
            ),
        );
        let gateway = authenticated(api, 2);
        let holdings = gateway
            .holdings(GetAccountHoldingsParams {
                account_id: "acc-invest".to_owned(),
            })
            .await
            .expect("known account");
        assert_eq!(holdings.len(), 1);

        let err = gateway
            .holdings(GetAccountHoldingsParams {
                account_id: "acc-nope".to_owned(),
            })
            .await
            .expect_err("unknown account");
        assert!(matches!(err, ToolError::Api { .. }));
        assert!(err.to_string().contains("acc-nope"));
    }

    #[tokio::test]
    async fn refresh_defaults_to_every_account() {
        let api = seeded();
        let gateway = authenticated(Arc::clone(&api), 2);
        let ack = gateway
            .refresh_accounts(RefreshAccountsParams::default())
            .await
            .expect("refresh");
        assert!(ack.requested);
        assert_eq!(ack.account_ids, vec!["acc-1".to_owned(), "acc-2".to_owned()]);
        assert_eq!(api.refreshed(), vec!["acc-1".to_owned(), "acc-2".to_owned()]);

        let ack = gateway
            .refresh_accounts(RefreshAccountsParams {
                account_ids: Some(vec!["acc-2".to_owned()]),
            })
            .await
            .expect("filtered refresh");
        assert_eq!(ack.account_ids, vec!["acc-2".to_owned()]);
    }

    #[tokio::test]
    async fn budgets_cover_the_requested_month() {
        let api = Arc::new(FakeMonarch::new().with_budget(BudgetPlan {
            budget_data: BudgetData {
                monthly_amounts_by_category: vec![CategoryAmounts {
                    category: NamedRef {
                        id: Some("cat-rent".to_owned()),
                        name: None,
                    },
                    monthly_amounts: vec![MonthlyAmount {
                        month: "2024-02-01".to_owned(),
                        planned_cash_flow_amount: Some(1_500.0),
                        actual_amount: Some(1_500.0),
                        remaining_amount: Some(0.0),
                    }],
                }],
            },
            category_groups: Vec::new(),
        }));
        let gateway = authenticated(api, 2);
        let budgets = gateway
            .budgets(GetBudgetsParams {
                month: Some("2024-02".to_owned()),
            })
            .await
            .expect("budgets");
        assert_eq!(budgets.start_date, "2024-02-01");
        assert_eq!(budgets.end_date, "2024-02-29");
        let rent = budgets.categories.get("cat-rent").expect("keyed by id");
        assert_eq!(rent.planned, 1_500.0);

        let err = gateway
            .budgets(GetBudgetsParams {
                month: Some("February".to_owned()),
            })
            .await
            .expect_err("bad month");
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn cashflow_uses_the_given_range() {
        let api = Arc::new(FakeMonarch::new().with_cashflow(CashflowPage {
            by_category: vec![CashflowCategory {
                group_by: CashflowGroupBy { category: None },
                summary: CashflowSum { sum: Some(-30.0) },
            }],
            summary: Vec::new(),
        }));
        let gateway = authenticated(Arc::clone(&api), 2);
        let cashflow = gateway
            .cashflow(GetCashflowParams {
                start_date: Some("2024-03-01".to_owned()),
                end_date: Some("2024-03-31".to_owned()),
            })
            .await
            .expect("cashflow");
        assert_eq!(cashflow.start_date, "2024-03-01");
        assert_eq!(cashflow.by_category.get("Uncategorized"), Some(&-30.0));
        assert!(cashflow.income.is_none());

        let err = gateway
            .cashflow(GetCashflowParams {
                start_date: Some("2024-03-01".to_owned()),
                end_date: None,
            })
            .await
            .expect_err("half a range");
        assert!(err.is_validation());
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_without_accounts_skips_the_request() {
        let api = Arc::new(FakeMonarch::new());
        let gateway = authenticated(Arc::clone(&api), 2);
        let ack = gateway
            .refresh_accounts(RefreshAccountsParams::default())
            .await
            .expect("refresh");
        assert!(!ack.requested);
        assert!(ack.account_ids.is_empty());
        assert!(ack.message.contains("no accounts"));
        assert_eq!(api.calls(), 1);
        assert!(api.refreshed().is_empty());
    }

    #[test]
    fn range_bounds_must_come_together() {
        assert!(parse_range(None, None).expect("no range").is_none());
        let err = parse_range(Some("2024-01-01"), None).expect_err("missing end");
        assert!(err.to_string().contains("`end_date`"));
        let err = parse_range(Some("2024-02-01"), Some("2024-01-01")).expect_err("reversed");
        assert!(err.to_string().contains("`start_date`"));
    }

    #[test]
    fn month_expands_to_its_days() {
        let (first, last) = parse_month("2024-02").expect("valid month");
        assert_eq!(first, date("2024-02-01"));
        assert_eq!(last, date("2024-02-29"));
        let _err = parse_month("2024-13").expect_err("no thirteenth month");
    }

    #[test]
    fn default_budget_period_spans_three_months() {
        let (start, end) = default_budget_range(date("2024-01-15")).expect("in range");
        assert_eq!(start, date("2023-12-01"));
        assert_eq!(end, date("2024-02-29"));
    }

    #[test]
    fn limits_and_offsets_clamp() {
        assert_eq!(clamp_limit(None), 100);
        assert_eq!(clamp_limit(Some(-7)), 1);
        assert_eq!(clamp_limit(Some(250)), 250);
        assert_eq!(clamp_limit(Some(i64::MAX)), 1_000);
        assert_eq!(clamp_offset(None), 0);
        assert_eq!(clamp_offset(Some(-1)), 0);
        assert_eq!(clamp_offset(Some(40)), 40);
    }
}

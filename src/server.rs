//! MCP server exposing Monarch Money operations as tools.
//!
//! Uses `rmcp` macros for dispatch; the actual work happens in
//! [`Gateway`]. Argument errors become MCP `invalid_params` errors, every
//! other failure is returned as an error tool result so the session stays
//! usable.

extern crate alloc;

use alloc::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::error::ToolError;
use crate::gateway::{Gateway, SETUP_INSTRUCTIONS};
use crate::params::{
    CreateTransactionParams, GetAccountHoldingsParams, GetBudgetsParams, GetCashflowParams,
    GetTransactionsParams, RefreshAccountsParams, UpdateTransactionParams,
};

/// MCP server wrapping the Monarch Money personal finance API.
#[derive(Clone)]
pub(crate) struct MonarchMcpServer {
    /// Shared tool operations.
    gateway: Arc<Gateway>,
    /// Tool router for dispatching MCP tool calls.
    tool_router: ToolRouter<Self>,
}

impl core::fmt::Debug for MonarchMcpServer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MonarchMcpServer")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

/// Serializes a value to a pretty-printed JSON string for tool output.
fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, McpError> {
    serde_json::to_string_pretty(value).map_err(|err| {
        McpError::internal_error(format!("failed to serialize response: {err}"), None)
    })
}

/// Creates a successful tool result containing JSON text.
fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = to_json_text(value)?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Converts a gateway outcome into a tool result.
fn tool_result<T: serde::Serialize>(
    tool: &'static str,
    outcome: Result<T, ToolError>,
) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(value) => json_result(&value),
        Err(err) if err.is_validation() => Err(McpError::invalid_params(err.to_string(), None)),
        Err(err) => {
            tracing::warn!(tool, %err, "tool call failed");
            Ok(CallToolResult::error(vec![Content::text(err.to_string())]))
        }
    }
}

#[tool_router]
impl MonarchMcpServer {
    /// Creates a new MCP server over the given gateway.
    pub(crate) fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
            tool_router: Self::tool_router(),
        }
    }

    // ── Auth tools ──────────────────────────────────────────────────

    /// Explains how to create a session file.
    #[tool(
        description = "Show one-time setup instructions for authenticating with Monarch Money"
    )]
    async fn setup_authentication(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(
            SETUP_INSTRUCTIONS,
        )]))
    }

    /// Reports whether the server is authenticated.
    #[tool(
        description = "Check whether the server is authenticated with Monarch Money and which session file it uses"
    )]
    async fn check_auth_status(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.gateway.auth_status())
    }

    // ── Read tools ──────────────────────────────────────────────────

    /// Lists all accounts.
    #[tool(description = "List all financial accounts with balances, types and institutions")]
    async fn get_accounts(&self) -> Result<CallToolResult, McpError> {
        tool_result("get_accounts", self.gateway.accounts().await)
    }

    /// Lists transactions with optional filtering.
    #[tool(
        description = "List transactions, newest first. Filters: start_date and end_date (YYYY-MM-DD, both or neither), account_id, category_id, search. Paging: limit (default 100, max 1000) and offset"
    )]
    async fn get_transactions(
        &self,
        params: Parameters<GetTransactionsParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result("get_transactions", self.gateway.transactions(params.0).await)
    }

    /// Budget figures per category.
    #[tool(
        description = "Get budgeted, actual and remaining amounts per category. Optional month (YYYY-MM); defaults to last month through next month"
    )]
    async fn get_budgets(
        &self,
        params: Parameters<GetBudgetsParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result("get_budgets", self.gateway.budgets(params.0).await)
    }

    /// Income, expenses and savings.
    #[tool(
        description = "Get income, expenses, savings and per-category totals for a date range (YYYY-MM-DD); defaults to the current month"
    )]
    async fn get_cashflow(
        &self,
        params: Parameters<GetCashflowParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result("get_cashflow", self.gateway.cashflow(params.0).await)
    }

    /// Holdings of an investment account.
    #[tool(description = "List securities held in an investment account")]
    async fn get_account_holdings(
        &self,
        params: Parameters<GetAccountHoldingsParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result("get_account_holdings", self.gateway.holdings(params.0).await)
    }

    // ── Write tools ─────────────────────────────────────────────────

    /// Creates a manual transaction.
    #[tool(
        description = "Create a transaction. Amount is signed: negative for expenses, positive for income. Date is YYYY-MM-DD"
    )]
    async fn create_transaction(
        &self,
        params: Parameters<CreateTransactionParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result(
            "create_transaction",
            self.gateway.create_transaction(params.0).await,
        )
    }

    /// Updates fields of an existing transaction.
    #[tool(
        description = "Update a transaction. Only the fields you pass are changed; at least one is required"
    )]
    async fn update_transaction(
        &self,
        params: Parameters<UpdateTransactionParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result(
            "update_transaction",
            self.gateway.update_transaction(params.0).await,
        )
    }

    /// Asks Monarch to re-sync accounts with their institutions.
    #[tool(
        description = "Request a refresh of account data from the connected institutions. Returns once the request is queued; defaults to all accounts"
    )]
    async fn refresh_accounts(
        &self,
        params: Parameters<RefreshAccountsParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result(
            "refresh_accounts",
            self.gateway.refresh_accounts(params.0).await,
        )
    }
}

#[tool_handler]
impl ServerHandler for MonarchMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Monarch Money personal finance MCP server. \
                 Call check_auth_status first; if it is not authenticated, \
                 call setup_authentication. Then query accounts, transactions, \
                 budgets, cashflow and holdings, or create and update transactions."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    extern crate alloc;

    use alloc::sync::Arc;
    use std::path::Path;

    use rmcp::model::CallToolResult;

    use super::{MonarchMcpServer, tool_result};
    use crate::auth::{AuthSource, AuthState, Startup};
    use crate::error::ToolError;
    use crate::gateway::Gateway;
    use crate::monarch::fake::{self, FakeMonarch};
    use crate::pool::WorkerPool;
    use crate::session::SessionLocations;

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|content| content.as_text().map(|body| body.text.clone()))
            .collect()
    }

    fn server() -> MonarchMcpServer {
        let api = Arc::new(FakeMonarch::new().with_account(fake::account("acc-1", "Checking")));
        MonarchMcpServer::new(Gateway::new(
            Startup {
                state: AuthState::Authenticated {
                    client: api,
                    source: AuthSource::Credentials,
                },
                session_path: None,
                locations: SessionLocations::new(None, Path::new("/nonexistent"), None),
                email: Some("me@example.com".to_owned()),
            },
            WorkerPool::new(1),
        ))
    }

    #[test]
    fn registers_every_tool() {
        let mut names: Vec<String> = server()
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "check_auth_status",
                "create_transaction",
                "get_account_holdings",
                "get_accounts",
                "get_budgets",
                "get_cashflow",
                "get_transactions",
                "refresh_accounts",
                "setup_authentication",
                "update_transaction",
            ]
        );
    }

    #[test]
    fn validation_errors_are_invalid_params() {
        let outcome: Result<(), ToolError> = Err(ToolError::invalid("date", "not a date"));
        let err = tool_result("create_transaction", outcome).expect_err("protocol error");
        assert!(err.message.contains("`date`"));
    }

    #[test]
    fn other_errors_are_error_results() {
        let outcome: Result<(), ToolError> = Err(ToolError::SessionExpired);
        let result = tool_result("get_accounts", outcome).expect("tool result");
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("monarch-mcp login"));
    }

    #[tokio::test]
    async fn accounts_are_returned_as_json() {
        let result = server().get_accounts().await.expect("tool result");
        assert_ne!(result.is_error, Some(true));
        let value: serde_json::Value =
            serde_json::from_str(&text(&result)).expect("JSON body");
        assert_eq!(
            value
                .pointer("/0/name")
                .and_then(serde_json::Value::as_str),
            Some("Checking")
        );
    }

    #[tokio::test]
    async fn auth_status_reports_credentials_source() {
        let result = server().check_auth_status().await.expect("tool result");
        let value: serde_json::Value =
            serde_json::from_str(&text(&result)).expect("JSON body");
        assert_eq!(value.get("auth_source"), Some(&serde_json::json!("credentials")));
        assert_eq!(
            value.get("environment_email"),
            Some(&serde_json::json!("me@example.com"))
        );
    }
}

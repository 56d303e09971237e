//! HTTP implementation of [`MonarchApi`] over `reqwest`.
//!
//! Authentication uses a long-lived token sent as `Authorization: Token
//! <token>`. The token is obtained from the login endpoint and persisted in a
//! session file whose format belongs to this module alone.

use core::time::Duration;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::error::MonarchError;
use super::models::{
    Account, AccountList, BudgetPlan, CashflowPage, CreateTransactionData, Holding,
    HoldingsData, NewTransaction, PayloadError, RefreshData, Transaction, TransactionList,
    TransactionPage, TransactionPayload, TransactionQuery, TransactionUpdate,
    UpdateTransactionData,
};
use super::queries;
use super::MonarchApi;

/// Monarch Money API origin.
const API_URL: &str = "https://api.monarchmoney.com";

/// GraphQL endpoint path.
const GRAPHQL_PATH: &str = "/graphql";

/// Login endpoint path.
const LOGIN_PATH: &str = "/auth/login/";

/// Value of the `Client-Platform` header the API expects.
const CLIENT_PLATFORM: &str = "web";

/// User agent sent with every request.
const CLIENT_USER_AGENT: &str = concat!("monarch-mcp/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout enforced by the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// On-disk session format.
#[derive(Debug, Serialize, Deserialize)]
struct SessionBundle {
    /// API token.
    token: String,
}

/// Body of a login request.
#[derive(Debug, Serialize)]
struct LoginRequest<'req> {
    /// Account email.
    username: &'req str,
    /// Account password.
    password: &'req str,
    /// Tells the API the caller can answer an MFA challenge.
    supports_mfa: bool,
    /// Do not register this client as a trusted device.
    trusted_device: bool,
    /// One-time code, when MFA is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    totp: Option<&'req str>,
}

/// Body of a successful login response.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    /// API token.
    token: String,
}

/// Standard GraphQL response envelope.
///
/// `data` stays untyped until `errors` has been checked: a failed mutation
/// comes back as `null` payloads next to the error list.
#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    /// Query result.
    data: Option<Value>,
    /// Errors reported by the server.
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Deserialize)]
struct GraphQlError {
    /// Error message.
    message: String,
}

/// Authenticated Monarch Money client.
pub(crate) struct MonarchClient {
    /// HTTP client with default headers (including authorization).
    http: reqwest::Client,
    /// API origin.
    base_url: String,
    /// API token, kept for [`MonarchClient::save_session`].
    token: String,
}

impl core::fmt::Debug for MonarchClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MonarchClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Headers sent with every request, authenticated or not.
fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let _accept = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    let _agent = headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    let _platform = headers.insert(
        HeaderName::from_static("client-platform"),
        HeaderValue::from_static(CLIENT_PLATFORM),
    );
    if let Ok(device) = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
        let _device = headers.insert(HeaderName::from_static("device-uuid"), device);
    }
    headers
}

/// Builds a `reqwest` client with the given default headers.
fn build_http(headers: HeaderMap) -> Result<reqwest::Client, MonarchError> {
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Extracts a readable reason from a failed login response body.
fn login_failure_reason(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .get("detail")
            .or_else(|| value.get("error_code"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    });
    detail.unwrap_or_else(|| format!("HTTP {status}"))
}

/// Maps a non-success GraphQL response status to an error.
fn graphql_status_error(status: StatusCode, body: &str) -> Option<MonarchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => MonarchError::SessionExpired,
        StatusCode::TOO_MANY_REQUESTS => MonarchError::RateLimited,
        _ => MonarchError::Api {
            status: status.as_u16(),
            message: if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_owned()
            } else {
                body.to_owned()
            },
        },
    })
}

/// Maps a non-success login response status to an error.
fn login_status_error(status: StatusCode, mfa_given: bool, body: &str) -> Option<MonarchError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::FORBIDDEN if mfa_given => {
            MonarchError::Login("the MFA code was rejected".to_owned())
        }
        StatusCode::FORBIDDEN => MonarchError::MfaRequired,
        StatusCode::TOO_MANY_REQUESTS => MonarchError::RateLimited,
        _ => MonarchError::Login(login_failure_reason(status, body)),
    })
}

/// Decodes a GraphQL response body, reporting `errors` before typing `data`.
fn decode_envelope<T: DeserializeOwned>(
    operation: &'static str,
    body: &[u8],
) -> Result<T, MonarchError> {
    let envelope: GraphQlResponse = serde_json::from_slice(body)?;
    if !envelope.errors.is_empty() {
        let messages: Vec<&str> = envelope
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();
        return Err(MonarchError::GraphQl(messages.join("; ")));
    }
    let data = envelope
        .data
        .ok_or(MonarchError::EmptyResponse(operation))?;
    Ok(serde_json::from_value(data)?)
}

/// Converts a mutation payload into its transaction, surfacing payload errors.
fn payload_transaction(
    returned: Option<TransactionPayload>,
    operation: &'static str,
) -> Result<Transaction, MonarchError> {
    let payload = returned.ok_or(MonarchError::EmptyResponse(operation))?;
    if let Some(message) = payload.errors.as_ref().and_then(PayloadError::describe) {
        return Err(MonarchError::Mutation(message));
    }
    payload
        .transaction
        .ok_or(MonarchError::EmptyResponse(operation))
}

/// Builds the `filters` variable shared by transaction and cashflow queries.
fn transaction_filters(
    search: Option<&str>,
    account_id: Option<&str>,
    category_id: Option<&str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Value {
    let mut filters = json!({
        "search": search.unwrap_or_default(),
        "accounts": account_id.into_iter().collect::<Vec<_>>(),
        "categories": category_id.into_iter().collect::<Vec<_>>(),
        "tags": [],
    });
    if let Some(object) = filters.as_object_mut() {
        if let Some(start) = start_date {
            let _previous = object.insert("startDate".to_owned(), json!(start));
        }
        if let Some(end) = end_date {
            let _previous = object.insert("endDate".to_owned(), json!(end));
        }
    }
    filters
}

impl MonarchClient {
    /// Creates a client that authenticates with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`MonarchError::InvalidToken`] if the token cannot be used as a
    /// header value, or a transport error if the HTTP client fails to build.
    pub(crate) fn with_token(token: String) -> Result<Self, MonarchError> {
        Self::with_base_url(API_URL.to_owned(), token)
    }

    /// Creates a client against a specific API origin.
    fn with_base_url(base_url: String, token: String) -> Result<Self, MonarchError> {
        let mut authorization = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_err| MonarchError::InvalidToken)?;
        authorization.set_sensitive(true);
        let mut headers = base_headers();
        let _previous = headers.insert(AUTHORIZATION, authorization);
        Ok(Self {
            http: build_http(headers)?,
            base_url,
            token,
        })
    }

    /// Creates a client from a session file written by [`Self::save_session`].
    ///
    /// The file is decoded the same way whatever its name or extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a session
    /// document, or holds an empty token.
    pub(crate) fn load_session(path: &Path) -> Result<Self, MonarchError> {
        let bytes = fs::read(path)?;
        let bundle: SessionBundle =
            serde_json::from_slice(&bytes).map_err(|err| MonarchError::InvalidSession {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        let token = bundle.token.trim();
        if token.is_empty() {
            return Err(MonarchError::InvalidSession {
                path: path.to_path_buf(),
                reason: "token is empty".to_owned(),
            });
        }
        Self::with_token(token.to_owned())
    }

    /// Writes the session token to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub(crate) fn save_session(&self, path: &Path) -> Result<(), MonarchError> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bundle = SessionBundle {
            token: self.token.clone(),
        };
        fs::write(path, serde_json::to_vec(&bundle)?)?;
        Ok(())
    }

    /// Logs in with email and password, plus a one-time code if MFA is on.
    ///
    /// # Errors
    ///
    /// Returns [`MonarchError::MfaRequired`] when the account needs a code
    /// and none was given, [`MonarchError::Login`] when the credentials or
    /// code are rejected, or a transport error.
    pub(crate) async fn login(
        email: &str,
        password: &str,
        mfa_code: Option<&str>,
    ) -> Result<Self, MonarchError> {
        let http = build_http(base_headers())?;
        let request = LoginRequest {
            username: email,
            password,
            supports_mfa: true,
            trusted_device: false,
            totp: mfa_code,
        };
        let response = http
            .post(format!("{API_URL}{LOGIN_PATH}"))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body: LoginResponse = if status.is_success() {
            response.json().await?
        } else {
            let text = response.text().await.unwrap_or_default();
            if let Some(err) = login_status_error(status, mfa_code.is_some(), &text) {
                return Err(err);
            }
            serde_json::from_str(&text)?
        };
        tracing::debug!("login accepted");
        Self::with_token(body.token)
    }

    /// Sends one GraphQL operation and decodes its `data`.
    async fn graphql<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
    ) -> Result<T, MonarchError> {
        let body = json!({
            "operationName": operation,
            "query": query,
            "variables": variables,
        });
        tracing::debug!(operation, "sending GraphQL request");
        let response = self
            .http
            .post(format!("{}{GRAPHQL_PATH}", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if let Some(err) = graphql_status_error(status, &String::from_utf8_lossy(&body)) {
            return Err(err);
        }
        decode_envelope(operation, &body)
    }
}

#[async_trait]
impl MonarchApi for MonarchClient {
    async fn accounts(&self) -> Result<Vec<Account>, MonarchError> {
        let list: AccountList = self
            .graphql("GetAccounts", queries::GET_ACCOUNTS, json!({}))
            .await?;
        Ok(list.accounts)
    }

    async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, MonarchError> {
        let filters = transaction_filters(
            query.search.as_deref(),
            query.account_id.as_deref(),
            query.category_id.as_deref(),
            query.start_date,
            query.end_date,
        );
        let list: TransactionList = self
            .graphql(
                "GetTransactionsList",
                queries::GET_TRANSACTIONS,
                json!({
                    "offset": query.offset,
                    "limit": query.limit,
                    "orderBy": "date",
                    "filters": filters,
                }),
            )
            .await?;
        Ok(list.all_transactions)
    }

    async fn budgets(&self, start: NaiveDate, end: NaiveDate) -> Result<BudgetPlan, MonarchError> {
        self.graphql(
            "GetJointPlanningData",
            queries::GET_BUDGETS,
            json!({ "startDate": start, "endDate": end }),
        )
        .await
    }

    async fn cashflow(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CashflowPage, MonarchError> {
        let filters = transaction_filters(None, None, None, Some(start), Some(end));
        self.graphql(
            "Web_GetCashFlowPage",
            queries::GET_CASHFLOW,
            json!({ "filters": filters }),
        )
        .await
    }

    async fn holdings(&self, account_id: &str) -> Result<Vec<Holding>, MonarchError> {
        let data: HoldingsData = self
            .graphql(
                "Web_GetHoldings",
                queries::GET_HOLDINGS,
                json!({
                    "input": {
                        "accountIds": [account_id],
                        "includeHiddenHoldings": true,
                    }
                }),
            )
            .await?;
        let portfolio = data.portfolio.ok_or_else(|| {
            MonarchError::GraphQl(format!("no portfolio found for account {account_id}"))
        })?;
        Ok(portfolio
            .aggregate_holdings
            .edges
            .into_iter()
            .map(|edge| edge.node)
            .collect())
    }

    async fn create_transaction(
        &self,
        input: &NewTransaction,
    ) -> Result<Transaction, MonarchError> {
        let data: CreateTransactionData = self
            .graphql(
                "Common_CreateTransactionMutation",
                queries::CREATE_TRANSACTION,
                json!({ "input": input }),
            )
            .await?;
        payload_transaction(data.create_transaction, "Common_CreateTransactionMutation")
    }

    async fn update_transaction(
        &self,
        update: &TransactionUpdate,
    ) -> Result<Transaction, MonarchError> {
        let data: UpdateTransactionData = self
            .graphql(
                "Web_TransactionDrawerUpdateTransaction",
                queries::UPDATE_TRANSACTION,
                json!({ "input": update }),
            )
            .await?;
        payload_transaction(
            data.update_transaction,
            "Web_TransactionDrawerUpdateTransaction",
        )
    }

    async fn request_refresh(&self, account_ids: &[String]) -> Result<bool, MonarchError> {
        let data: RefreshData = self
            .graphql(
                "Common_ForceRefreshAccountsMutation",
                queries::REFRESH_ACCOUNTS,
                json!({ "input": { "accountIds": account_ids } }),
            )
            .await?;
        let payload = data
            .force_refresh_accounts
            .ok_or(MonarchError::EmptyResponse("Common_ForceRefreshAccountsMutation"))?;
        if let Some(message) = payload.errors.as_ref().and_then(PayloadError::describe) {
            return Err(MonarchError::Mutation(message));
        }
        Ok(payload.success)
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::panic,
    clippy::missing_docs_in_private_items,
    clippy::use_debug,
    reason = "test code uses expect and panic and inspects Debug output"
)]
mod tests {
    use std::fs;

    use reqwest::StatusCode;

    use super::{
        MonarchClient, decode_envelope, graphql_status_error, login_failure_reason,
        login_status_error, payload_transaction, transaction_filters,
    };
    use crate::monarch::MonarchError;
    use crate::monarch::models::{AccountList, UpdateTransactionData};

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");
        let client = MonarchClient::with_token("abc123".to_owned()).expect("client");
        client.save_session(&path).expect("save");
        let loaded = MonarchClient::load_session(&path).expect("load");
        assert_eq!(loaded.token, "abc123");
    }

    #[test]
    fn session_decoding_ignores_file_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mm_session.pickle");
        fs::write(&path, br#"{"token": "tok"}"#).expect("write");
        let loaded = MonarchClient::load_session(&path).expect("load");
        assert_eq!(loaded.token, "tok");
    }

    #[test]
    fn corrupt_session_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("monarch_session.json");
        fs::write(&path, b"\x80\x04\x95garbage").expect("write");
        let err = MonarchClient::load_session(&path).expect_err("should fail");
        assert!(matches!(err, MonarchError::InvalidSession { .. }));
    }

    #[test]
    fn blank_token_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("monarch_session.json");
        fs::write(&path, br#"{"token": "  "}"#).expect("write");
        let err = MonarchClient::load_session(&path).expect_err("should fail");
        assert!(err.to_string().contains("token is empty"));
    }

    #[test]
    fn token_with_newline_is_invalid() {
        let err = MonarchClient::with_token("bad\ntoken".to_owned()).expect_err("should fail");
        assert!(matches!(err, MonarchError::InvalidToken));
    }

    #[test]
    fn debug_output_hides_token() {
        let client = MonarchClient::with_token("secret-token".to_owned()).expect("client");
        assert!(!format!("{client:?}").contains("secret-token"));
    }

    #[test]
    fn login_failure_prefers_detail() {
        let reason = login_failure_reason(
            StatusCode::UNAUTHORIZED,
            r#"{"detail": "Incorrect password"}"#,
        );
        assert_eq!(reason, "Incorrect password");
        let fallback = login_failure_reason(StatusCode::NOT_FOUND, "<html>");
        assert_eq!(fallback, "HTTP 404 Not Found");
    }

    #[test]
    fn filters_include_dates_only_when_set() {
        let filters = transaction_filters(Some("coffee"), Some("acc-1"), None, None, None);
        let object = filters.as_object().expect("object");
        assert_eq!(object.get("search").and_then(|v| v.as_str()), Some("coffee"));
        assert!(!object.contains_key("startDate"));
        assert_eq!(
            object.get("accounts"),
            Some(&serde_json::json!(["acc-1"]))
        );
    }

    #[test]
    fn unauthorized_marks_the_session_expired() {
        let err = graphql_status_error(StatusCode::UNAUTHORIZED, "").expect("error");
        assert!(err.is_session_expired());
        let err = graphql_status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").expect("error");
        assert!(matches!(err, MonarchError::RateLimited));
        assert!(graphql_status_error(StatusCode::OK, "").is_none());
    }

    #[test]
    fn other_statuses_keep_the_body() {
        let err = graphql_status_error(StatusCode::BAD_GATEWAY, "upstream down").expect("error");
        match err {
            MonarchError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("expected Api error, got {other}"),
        }
        let err = graphql_status_error(StatusCode::SERVICE_UNAVAILABLE, " ").expect("error");
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn login_statuses_map_to_mfa_and_rate_limit() {
        let err = login_status_error(StatusCode::FORBIDDEN, false, "").expect("error");
        assert!(matches!(err, MonarchError::MfaRequired));
        let err = login_status_error(StatusCode::FORBIDDEN, true, "").expect("error");
        assert!(err.to_string().contains("MFA code was rejected"));
        let err = login_status_error(StatusCode::TOO_MANY_REQUESTS, false, "").expect("error");
        assert!(matches!(err, MonarchError::RateLimited));
        let err = login_status_error(
            StatusCode::UNAUTHORIZED,
            false,
            r#"{"detail": "Incorrect password"}"#,
        )
        .expect("error");
        assert_eq!(err.to_string(), "login failed: Incorrect password");
    }

    #[test]
    fn graphql_errors_are_reported_verbatim() {
        let body = br#"{"data": null, "errors": [{"message": "first"}, {"message": "second"}]}"#;
        let err = decode_envelope::<AccountList>("GetAccounts", body).expect_err("errors");
        assert_eq!(err.to_string(), "Monarch Money GraphQL error: first; second");
    }

    #[test]
    fn null_mutation_payload_keeps_the_error_message() {
        let body = br#"{"data": {"updateTransaction": null}, "errors": [{"message": "Transaction not found"}]}"#;
        let err = decode_envelope::<UpdateTransactionData>("Web_TransactionDrawerUpdateTransaction", body)
            .expect_err("errors");
        assert!(err.to_string().contains("Transaction not found"));
    }

    #[test]
    fn null_mutation_payload_without_errors_is_empty() {
        let body = br#"{"data": {"updateTransaction": null}}"#;
        let data = decode_envelope::<UpdateTransactionData>("Web_TransactionDrawerUpdateTransaction", body)
            .expect("decodes");
        let err = payload_transaction(data.update_transaction, "Web_TransactionDrawerUpdateTransaction")
            .expect_err("no payload");
        assert!(matches!(err, MonarchError::EmptyResponse(_)));
    }

    #[test]
    fn missing_data_is_empty_response() {
        let err = decode_envelope::<AccountList>("GetAccounts", br#"{"data": null}"#)
            .expect_err("no data");
        assert!(matches!(err, MonarchError::EmptyResponse("GetAccounts")));
        let list = decode_envelope::<AccountList>("GetAccounts", br#"{"data": {"accounts": []}}"#)
            .expect("empty list");
        assert!(list.accounts.is_empty());
    }
}

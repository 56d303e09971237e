//! Startup authentication.
//!
//! Runs once: try the resolved session file, then environment credentials.
//! Failure leaves the server in degraded mode instead of stopping it.

extern crate alloc;

use alloc::sync::Arc;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::config::{Config, Credentials, EMAIL_VAR, PASSWORD_VAR};
use crate::monarch::{MonarchApi, MonarchClient, MonarchError};
use crate::session::SessionLocations;

/// How to recover from missing or rejected authentication.
pub(crate) const REMEDIATION: &str = "Run `monarch-mcp login` with MONARCH_EMAIL and \
     MONARCH_PASSWORD set to save a session file, or set those variables for the \
     server itself, then restart the server. Call setup_authentication for details.";

/// Digits in a Monarch TOTP code.
const MFA_DIGITS: usize = 6;
/// TOTP time step in seconds.
const MFA_STEP_SECS: u64 = 30;

/// Creates authenticated API handles.
#[async_trait]
pub(crate) trait Connector: Send + Sync {
    /// Builds a handle from a session file.
    fn load_session(&self, path: &Path) -> Result<Arc<dyn MonarchApi>, MonarchError>;

    /// Builds a handle by logging in.
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn MonarchApi>, MonarchError>;
}

/// [`Connector`] backed by the real Monarch Money API.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MonarchConnector;

#[async_trait]
impl Connector for MonarchConnector {
    fn load_session(&self, path: &Path) -> Result<Arc<dyn MonarchApi>, MonarchError> {
        let client = MonarchClient::load_session(path)?;
        Ok(Arc::new(client))
    }

    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn MonarchApi>, MonarchError> {
        let client = login(credentials, None).await?;
        Ok(Arc::new(client))
    }
}

/// Logs in with `credentials`.
///
/// An explicit `mfa_code` takes precedence over one derived from the
/// configured MFA secret.
///
/// # Errors
///
/// Returns an error if the MFA secret is malformed or the login is rejected.
pub(crate) async fn login(
    credentials: &Credentials,
    mfa_code: Option<&str>,
) -> Result<MonarchClient, MonarchError> {
    let derived = match (mfa_code, credentials.mfa_secret.as_deref()) {
        (None, Some(secret)) => Some(current_mfa_code(secret)?),
        (Some(_) | None, _) => None,
    };
    let code = mfa_code.or(derived.as_deref());
    MonarchClient::login(&credentials.email, &credentials.password, code).await
}

/// Checks a freshly logged-in session with one accounts query, then saves
/// it to every target. Returns the number of files written.
///
/// # Errors
///
/// Returns an error if the session is not accepted; nothing is saved then.
pub(crate) async fn persist_session<F>(
    api: &dyn MonarchApi,
    targets: &[&Path],
    save: F,
) -> Result<usize, MonarchError>
where
    F: Fn(&Path) -> Result<(), MonarchError>,
{
    let accounts = api.accounts().await?;
    tracing::info!(accounts = accounts.len(), "session verified");
    let mut saved = 0_usize;
    for &path in targets {
        match save(path) {
            Ok(()) => {
                saved += 1;
                tracing::info!(path = %path.display(), "session saved");
            }
            Err(err) => tracing::warn!(path = %path.display(), %err, "failed to save session"),
        }
    }
    Ok(saved)
}

/// Computes the current TOTP code for a base32 secret.
fn current_mfa_code(secret: &str) -> Result<String, MonarchError> {
    let normalized: String = secret
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|err| MonarchError::Login(format!("MONARCH_MFA_SECRET is not valid base32: {err}")))?;
    let totp = TOTP::new_unchecked(Algorithm::SHA1, MFA_DIGITS, 1, MFA_STEP_SECS, bytes);
    totp.generate_current()
        .map_err(|err| MonarchError::Login(format!("system clock error: {err}")))
}

/// How the client handle was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthSource {
    /// Loaded from this session file.
    SessionFile(PathBuf),
    /// Logged in with environment credentials.
    Credentials,
}

/// Outcome of startup authentication.
pub(crate) enum AuthState {
    /// A client handle is available.
    Authenticated {
        /// Shared API handle.
        client: Arc<dyn MonarchApi>,
        /// Where it came from.
        source: AuthSource,
    },
    /// Degraded mode.
    Failed {
        /// Why authentication failed.
        reason: String,
    },
}

impl core::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::Authenticated { ref source, .. } => f
                .debug_struct("Authenticated")
                .field("source", source)
                .finish_non_exhaustive(),
            Self::Failed { ref reason } => {
                f.debug_struct("Failed").field("reason", reason).finish()
            }
        }
    }
}

/// Everything the gateway needs to know about startup.
#[derive(Debug)]
pub(crate) struct Startup {
    /// Authentication outcome.
    pub(crate) state: AuthState,
    /// Session file found at startup, whether or not it loaded.
    pub(crate) session_path: Option<PathBuf>,
    /// Session file candidates, for status reporting.
    pub(crate) locations: SessionLocations,
    /// Configured login email.
    pub(crate) email: Option<String>,
}

/// Resolves a session and authenticates, never failing the process.
pub(crate) async fn start<C>(config: &Config, connector: &C) -> Startup
where
    C: Connector + ?Sized,
{
    let locations = SessionLocations::from_config(config);
    let session_path = locations.resolve().map(|candidate| candidate.path.clone());
    let state = authenticate(
        session_path.as_deref(),
        config.credentials.as_ref(),
        connector,
    )
    .await;
    Startup {
        state,
        session_path,
        locations,
        email: config.email().map(str::to_owned),
    }
}

/// The startup state machine: session file, then credentials, then fail.
async fn authenticate<C>(
    session_path: Option<&Path>,
    credentials: Option<&Credentials>,
    connector: &C,
) -> AuthState
where
    C: Connector + ?Sized,
{
    let session_problem = match session_path {
        Some(path) => match connector.load_session(path) {
            Ok(client) => {
                tracing::info!(path = %path.display(), "loaded Monarch Money session");
                return AuthState::Authenticated {
                    client,
                    source: AuthSource::SessionFile(path.to_path_buf()),
                };
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to load session file");
                err.to_string()
            }
        },
        None => {
            tracing::info!("no session file found");
            "no session file found".to_owned()
        }
    };

    let Some(creds) = credentials else {
        let reason = format!("{session_problem}, and {EMAIL_VAR}/{PASSWORD_VAR} are not set");
        tracing::warn!(%reason, "starting without authentication");
        return AuthState::Failed { reason };
    };

    match connector.login(creds).await {
        Ok(client) => {
            tracing::info!(email = %creds.email, "logged in with environment credentials");
            AuthState::Authenticated {
                client,
                source: AuthSource::Credentials,
            }
        }
        Err(err) => {
            let reason = format!("{session_problem}; login as {} failed: {err}", creds.email);
            tracing::warn!(%reason, "starting without authentication");
            AuthState::Failed { reason }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::panic,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect and panic for readability"
)]
mod tests {
    extern crate alloc;

    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::fs;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use super::{AuthSource, AuthState, Connector, current_mfa_code, persist_session, start};
    use crate::config::{Config, Credentials};
    use crate::monarch::fake::{self, FakeMonarch};
    use crate::monarch::{MonarchApi, MonarchError};

    #[derive(Default)]
    struct FakeConnector {
        session_loads: bool,
        login_succeeds: bool,
        loads: AtomicUsize,
        logins: AtomicUsize,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn load_session(&self, path: &Path) -> Result<Arc<dyn MonarchApi>, MonarchError> {
            let _previous = self.loads.fetch_add(1, Ordering::SeqCst);
            if self.session_loads {
                Ok(Arc::new(FakeMonarch::new()))
            } else {
                Err(MonarchError::InvalidSession {
                    path: path.to_path_buf(),
                    reason: "corrupt".to_owned(),
                })
            }
        }

        async fn login(
            &self,
            _credentials: &Credentials,
        ) -> Result<Arc<dyn MonarchApi>, MonarchError> {
            let _previous = self.logins.fetch_add(1, Ordering::SeqCst);
            if self.login_succeeds {
                Ok(Arc::new(FakeMonarch::new()))
            } else {
                Err(MonarchError::MfaRequired)
            }
        }
    }

    fn config(project: &Path, with_credentials: bool) -> Config {
        Config::from_lookup(
            |name| match name {
                "MONARCH_EMAIL" if with_credentials => Some("me@example.com".to_owned()),
                "MONARCH_PASSWORD" if with_credentials => Some("hunter2".to_owned()),
                _ => None,
            },
            project.to_path_buf(),
            None,
        )
        .expect("valid config")
    }

    fn write_session(project: &Path) -> PathBuf {
        let path = project.join("monarch_session.json");
        fs::write(&path, br#"{"token":"t"}"#).expect("write session");
        path
    }

    #[tokio::test]
    async fn session_file_authenticates_without_login() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_session(dir.path());
        let connector = FakeConnector {
            session_loads: true,
            ..FakeConnector::default()
        };
        let startup = start(&config(dir.path(), true), &connector).await;
        match startup.state {
            AuthState::Authenticated { source, .. } => {
                assert_eq!(source, AuthSource::SessionFile(path.clone()));
            }
            AuthState::Failed { reason } => panic!("expected authentication, got {reason}"),
        }
        assert_eq!(startup.session_path, Some(path));
        assert_eq!(connector.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_session_falls_back_to_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _path = write_session(dir.path());
        let connector = FakeConnector {
            login_succeeds: true,
            ..FakeConnector::default()
        };
        let startup = start(&config(dir.path(), true), &connector).await;
        assert!(matches!(
            startup.state,
            AuthState::Authenticated {
                source: AuthSource::Credentials,
                ..
            }
        ));
        assert_eq!(connector.loads.load(Ordering::SeqCst), 1);
        assert_eq!(connector.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nothing_available_is_degraded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = FakeConnector::default();
        let startup = start(&config(dir.path(), false), &connector).await;
        match startup.state {
            AuthState::Failed { reason } => {
                assert!(reason.contains("no session file found"));
                assert!(reason.contains("MONARCH_EMAIL"));
            }
            AuthState::Authenticated { .. } => panic!("expected degraded mode"),
        }
        assert!(startup.session_path.is_none());
        assert_eq!(connector.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_login_is_degraded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let connector = FakeConnector::default();
        let startup = start(&config(dir.path(), true), &connector).await;
        match startup.state {
            AuthState::Failed { reason } => {
                assert!(reason.contains("multi-factor authentication is required"));
            }
            AuthState::Authenticated { .. } => panic!("expected degraded mode"),
        }
        assert_eq!(startup.email.as_deref(), Some("me@example.com"));
    }

    #[tokio::test]
    async fn verified_session_is_saved_everywhere() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        let api = FakeMonarch::new().with_account(fake::account("acc-1", "Checking"));
        let saved = persist_session(&api, &[first.as_path(), second.as_path()], |path| {
            fs::write(path, b"{}").map_err(MonarchError::from)
        })
        .await
        .expect("session accepted");
        assert_eq!(saved, 2);
        assert!(first.is_file() && second.is_file());
    }

    #[tokio::test]
    async fn rejected_session_is_not_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a.json");
        let api = FakeMonarch::new();
        api.expire();
        let err = persist_session(&api, &[target.as_path()], |path| {
            fs::write(path, b"{}").map_err(MonarchError::from)
        })
        .await
        .expect_err("session rejected");
        assert!(err.is_session_expired());
        assert!(!target.exists());
    }

    #[test]
    fn mfa_code_has_six_digits() {
        let code = current_mfa_code("jbsw y3dp ehpk 3pxp").expect("valid secret");
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|ch| ch.is_ascii_digit()));
    }

    #[test]
    fn malformed_mfa_secret_is_rejected() {
        let err = current_mfa_code("not base32 !!").expect_err("invalid secret");
        assert!(err.to_string().contains("MONARCH_MFA_SECRET"));
    }
}

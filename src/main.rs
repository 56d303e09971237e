//! Monarch Money MCP server entry point.
//!
//! `serve` (the default) resolves a session file or logs in with
//! environment credentials, then serves MCP tools over stdio. Startup never
//! fails on authentication: the server comes up in degraded mode instead.
//! `login` performs an interactive-free login and saves the session file
//! the server looks for.

mod auth;
mod config;
mod error;
mod gateway;
mod monarch;
mod params;
mod pool;
mod response;
mod server;
mod session;

use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use crate::auth::MonarchConnector;
use crate::config::{Config, EMAIL_VAR, PASSWORD_VAR};
use crate::gateway::Gateway;
use crate::pool::WorkerPool;
use crate::server::MonarchMcpServer;
use crate::session::SessionLocations;

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(version, about = "MCP server for the Monarch Money personal finance API")]
struct Cli {
    /// What to do; defaults to `serve`.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Serve MCP tools over stdio.
    Serve,
    /// Log in with MONARCH_EMAIL/MONARCH_PASSWORD and save a session file.
    Login {
        /// One-time code from your authenticator app.
        #[arg(long)]
        mfa_code: Option<String>,
    },
}

/// Serves MCP tools over stdio until the client disconnects.
///
/// # Errors
///
/// Returns an error if the stdio transport fails.
async fn serve(config: &Config) -> Result<(), Box<dyn core::error::Error>> {
    tracing::info!("starting Monarch Money MCP server");

    let startup = auth::start(config, &MonarchConnector).await;
    let pool = WorkerPool::new(config.max_concurrency);
    let mcp_server = MonarchMcpServer::new(Gateway::new(startup, pool));

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = mcp_server.serve(transport).await?;

    tracing::info!(workers = config.max_concurrency, "MCP server running on stdio");
    let _quit_reason = service.waiting().await?;

    Ok(())
}

/// Logs in, checks the session, and writes it to every save location.
///
/// # Errors
///
/// Returns an error if credentials are missing, the login or the session
/// check is rejected, or no session file could be written.
async fn login(config: &Config, mfa_code: Option<&str>) -> Result<(), Box<dyn core::error::Error>> {
    let credentials = config
        .credentials
        .as_ref()
        .ok_or_else(|| format!("{EMAIL_VAR} and {PASSWORD_VAR} must be set to log in"))?;

    tracing::info!(email = %credentials.email, "logging in to Monarch Money");
    let client = auth::login(credentials, mfa_code).await?;

    let locations = SessionLocations::from_config(config);
    let saved = auth::persist_session(&client, &locations.save_targets(), |path| {
        client.save_session(path)
    })
    .await?;
    if saved == 0 {
        return Err("the session could not be saved to any location".into());
    }

    tracing::info!(saved, "login complete; restart the MCP server to use the session");
    Ok(())
}

/// Parses arguments, loads configuration, and runs the chosen command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
async fn run() -> Result<(), Box<dyn core::error::Error>> {
    let cli = Cli::parse();

    // A missing .env file is normal.
    let _env_file = dotenvy::dotenv().ok();

    // Initialise tracing to stderr (stdout is used for MCP stdio transport).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Login { mfa_code } => login(&config, mfa_code.as_deref()).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(%err, "fatal error");
        std::process::exit(1);
    }
}

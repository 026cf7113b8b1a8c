// ABOUTME: PostgreSQL connection utilities for the migration destination
// ABOUTME: Handles TLS setup, operator-facing error messages and connection retries

use crate::config::DestinationConfig;
use crate::utils;
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

/// Connect to the PostgreSQL destination with TLS support
pub async fn connect(config: &DestinationConfig) -> Result<Client> {
    let pg_config = config.to_pg_config()?;
    connect_pg(&pg_config, config).await
}

async fn connect_pg(
    pg_config: &tokio_postgres::Config,
    config: &DestinationConfig,
) -> Result<Client> {
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    tracing::info!("Connecting to PostgreSQL ({})", config);

    let (client, connection) = pg_config
        .connect(tls)
        .await
        .map_err(|e| describe_connect_error(&e.to_string()))?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

/// Turn a driver error into a message an operator can act on
fn describe_connect_error(error_msg: &str) -> anyhow::Error {
    if error_msg.contains("password authentication failed") {
        anyhow::anyhow!(
            "Authentication failed: Invalid username or password.\n\
             Please verify DB_USER / DB_PASSWORD."
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        anyhow::anyhow!(
            "Database does not exist: {}\n\
             Please create the database first or check DB_NAME.",
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect") {
        anyhow::anyhow!(
            "Connection refused: Unable to reach database server.\n\
             Please check:\n\
             - DB_HOST and DB_PORT are correct\n\
             - The database server is running\n\
             - Firewall rules allow connections\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        anyhow::anyhow!(
            "Connection timeout: Database server did not respond in time.\n\
             This could indicate network issues or server overload.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        anyhow::anyhow!(
            "TLS/SSL error: Failed to establish secure connection.\n\
             Please verify the DB_SSLMODE setting.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("no pg_hba.conf entry") {
        anyhow::anyhow!(
            "Access denied: No pg_hba.conf entry for host.\n\
             The database server is not configured to accept connections from your host.\n\
             Error: {}",
            error_msg
        )
    } else {
        anyhow::anyhow!("Failed to connect to database: {}", error_msg)
    }
}

/// Only unreachable or slow servers are worth another attempt
fn is_transient(error: &anyhow::Error) -> bool {
    let message = error.to_string();
    message.starts_with("Connection refused") || message.starts_with("Connection timeout")
}

/// Connect with automatic retry for transient failures
///
/// An invalid configuration, rejected credentials or a missing database fail
/// on the first attempt.
pub async fn connect_with_retry(config: &DestinationConfig) -> Result<Client> {
    let pg_config = config.to_pg_config()?;

    utils::retry_transient_with_backoff(
        || connect_pg(&pg_config, config),
        is_transient,
        3,                      // Max 3 retries
        Duration::from_secs(1), // Start with 1 second delay
    )
    .await
    .context("Failed to connect after retries")
}

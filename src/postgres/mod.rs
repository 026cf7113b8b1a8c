// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management and the destination Store implementation

pub mod connection;
pub mod store;

pub use connection::{connect, connect_with_retry};
pub use store::PostgresStore;

use crate::config::DestinationConfig;
use crate::error::{MigrateError, StoreRole};

/// Connect to the destination and wrap the client as a Store
pub async fn open_store(config: &DestinationConfig) -> Result<PostgresStore, MigrateError> {
    let client = connect_with_retry(config)
        .await
        .map_err(|e| MigrateError::Connection {
            store: StoreRole::Destination,
            message: format!("{:#}", e),
        })?;
    Ok(PostgresStore::new(client))
}

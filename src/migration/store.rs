// ABOUTME: Store trait implemented by the SQLite and PostgreSQL adapters
// ABOUTME: The thin database handle the repair and migration pipelines are generic over

use super::catalog::TableSpec;
use super::sql::Dialect;
use super::value::{Row, SqlValue};
use crate::error::StoreError;

/// A column as reported by schema introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Database handle exclusively owned by one repair or migration run.
///
/// Every call completes before the next one is issued; adapters never run
/// statements concurrently.
#[allow(async_fn_in_trait)]
pub trait Store {
    fn dialect(&self) -> Dialect;

    /// Execute a statement without parameters, returning affected rows
    async fn execute(&mut self, sql: &str) -> Result<u64, StoreError>;

    /// Columns of `table` in declaration order; empty when the table does not exist
    async fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError>;

    /// Read every row of a table, values in `spec` column order
    async fn read_rows(&mut self, spec: &TableSpec) -> Result<Vec<Row>, StoreError>;

    /// Insert unless a row with the same key exists. Returns whether a row was written.
    async fn insert_if_absent(
        &mut self,
        spec: &TableSpec,
        row: &[SqlValue],
    ) -> Result<bool, StoreError>;

    async fn count_rows(&mut self, table: &str) -> Result<i64, StoreError>;

    /// Release the handle
    async fn close(self) -> Result<(), StoreError>
    where
        Self: Sized;

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<(), StoreError> {
        let sql = self.dialect().foreign_key_checks(enabled);
        tracing::debug!("{}", sql);
        self.execute(sql).await.map(|_| ())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        Ok(!self.columns(table).await?.is_empty())
    }
}

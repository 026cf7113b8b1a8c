// ABOUTME: Store implementation backed by a tokio-postgres Client
// ABOUTME: information_schema introspection, typed parameters and session-scoped FK toggling

use crate::error::StoreError;
use crate::migration::catalog::{ColumnType, TableSpec};
use crate::migration::sql::Dialect;
use crate::migration::store::{ColumnDescriptor, Store};
use crate::migration::value::{Row, SqlValue};
use std::collections::HashMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Statement};

pub struct PostgresStore {
    client: Client,
    /// Prepared insert-if-absent statements, keyed by table
    inserts: HashMap<String, Statement>,
}

impl PostgresStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            inserts: HashMap::new(),
        }
    }
}

/// Convert a normalized value to a parameter matching the placeholder type
/// the insert statement declares for `column_type`.
pub fn to_param(
    value: &SqlValue,
    column_type: ColumnType,
) -> Result<Box<dyn ToSql + Sync>, StoreError> {
    let param: Box<dyn ToSql + Sync> = match (column_type, value) {
        (ColumnType::Integer, SqlValue::Null) => Box::new(None::<i32>),
        (ColumnType::Integer, SqlValue::Integer(i)) => Box::new(i32::try_from(*i).map_err(|_| {
            StoreError::new(format!("integer {} does not fit an INTEGER column", i))
        })?),
        (ColumnType::BigInt, SqlValue::Null) => Box::new(None::<i64>),
        (ColumnType::BigInt, SqlValue::Integer(i)) => Box::new(*i),
        (ColumnType::Real, SqlValue::Null) => Box::new(None::<f64>),
        (ColumnType::Real, SqlValue::Real(r)) => Box::new(*r),
        (ColumnType::Boolean, SqlValue::Null) => Box::new(None::<bool>),
        (ColumnType::Boolean, SqlValue::Boolean(b)) => Box::new(*b),
        (ColumnType::Text | ColumnType::Timestamp | ColumnType::Date, SqlValue::Null) => {
            Box::new(None::<String>)
        }
        (ColumnType::Text | ColumnType::Timestamp | ColumnType::Date, SqlValue::Text(s)) => {
            Box::new(s.clone())
        }
        (column_type, other) => {
            return Err(StoreError::new(format!(
                "value {} is not valid for a {:?} column",
                other, column_type
            )))
        }
    };
    Ok(param)
}

fn cell(row: &tokio_postgres::Row, idx: usize, column_type: ColumnType) -> Result<SqlValue, StoreError> {
    // select_all casts every column to bigint, float8, boolean or text
    let value = match column_type {
        ColumnType::Integer | ColumnType::BigInt => row
            .try_get::<_, Option<i64>>(idx)?
            .map(SqlValue::Integer),
        ColumnType::Real => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Real),
        ColumnType::Boolean => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Boolean),
        ColumnType::Text | ColumnType::Timestamp | ColumnType::Date => {
            row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

impl Store for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        tracing::debug!("postgres: {}", sql);
        Ok(self.client.execute(sql, &[]).await?)
    }

    async fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.is_nullable = 'YES',
                    EXISTS (
                        SELECT 1
                        FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage k
                          ON tc.constraint_name = k.constraint_name
                         AND tc.table_schema = k.table_schema
                         AND tc.table_name = k.table_name
                        WHERE tc.constraint_type = 'PRIMARY KEY'
                          AND tc.table_schema = c.table_schema
                          AND tc.table_name = c.table_name
                          AND k.column_name = c.column_name
                    )
                 FROM information_schema.columns c
                 WHERE c.table_schema = current_schema()
                   AND c.table_name = $1
                 ORDER BY c.ordinal_position",
                &[&table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get(0),
                declared_type: row.get(1),
                nullable: row.get(2),
                primary_key: row.get(3),
            })
            .collect())
    }

    async fn read_rows(&mut self, spec: &TableSpec) -> Result<Vec<Row>, StoreError> {
        let sql = self.dialect().select_all(spec);
        tracing::debug!("postgres: {}", sql);

        let rows = self.client.query(sql.as_str(), &[]).await?;
        rows.iter()
            .map(|row| {
                spec.columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| cell(row, idx, column.column_type))
                    .collect::<Result<Row, StoreError>>()
            })
            .collect()
    }

    async fn insert_if_absent(
        &mut self,
        spec: &TableSpec,
        row: &[SqlValue],
    ) -> Result<bool, StoreError> {
        if !self.inserts.contains_key(&spec.name) {
            let sql = Dialect::Postgres.insert_if_absent(spec);
            tracing::debug!("postgres: {}", sql);
            let statement = self.client.prepare(&sql).await?;
            self.inserts.insert(spec.name.clone(), statement);
        }
        let statement = &self.inserts[&spec.name];

        let params = row
            .iter()
            .zip(&spec.columns)
            .map(|(value, column)| to_param(value, column.column_type))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();

        let inserted = self.client.execute(statement, &refs).await?;
        Ok(inserted == 1)
    }

    async fn count_rows(&mut self, table: &str) -> Result<i64, StoreError> {
        let sql = self.dialect().count_rows(table);
        let row = self.client.query_one(sql.as_str(), &[]).await?;
        Ok(row.try_get(0)?)
    }

    async fn close(self) -> Result<(), StoreError> {
        // Dropping the client ends the session and its connection task
        drop(self.client);
        Ok(())
    }
}

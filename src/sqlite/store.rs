// ABOUTME: Store implementation backed by a rusqlite Connection
// ABOUTME: PRAGMA-based introspection, ON CONFLICT inserts and connection-scoped FK toggling

use crate::error::StoreError;
use crate::migration::catalog::TableSpec;
use crate::migration::sql::Dialect;
use crate::migration::store::{ColumnDescriptor, Store};
use crate::migration::value::{Row, SqlValue};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wrap an open connection, enabling foreign-key enforcement on it
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn foreign_keys_enabled(&self) -> Result<bool, StoreError> {
        let on: i64 = self
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        Ok(on == 1)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            SqlValue::Boolean(b) => ToSqlOutput::Owned(Value::Integer(*b as i64)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Result<SqlValue, StoreError> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(r) => SqlValue::Real(r),
        ValueRef::Text(t) => SqlValue::Text(
            std::str::from_utf8(t)
                .map_err(|e| StoreError::new(format!("invalid UTF-8 in text value: {}", e)))?
                .to_string(),
        ),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    })
}

impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        tracing::debug!("sqlite: {}", sql);
        Ok(self.conn.execute(sql, [])? as u64)
    }

    async fn columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| {
                let not_null: i64 = row.get(2)?;
                let pk: i64 = row.get(3)?;
                Ok(ColumnDescriptor {
                    name: row.get(0)?,
                    declared_type: row.get(1)?,
                    nullable: not_null == 0,
                    primary_key: pk > 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    async fn read_rows(&mut self, spec: &TableSpec) -> Result<Vec<Row>, StoreError> {
        let sql = self.dialect().select_all(spec);
        tracing::debug!("sqlite: {}", sql);

        let width = spec.columns.len();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(from_value_ref(row.get_ref(idx)?)?);
            }
            result.push(values);
        }

        Ok(result)
    }

    async fn insert_if_absent(
        &mut self,
        spec: &TableSpec,
        row: &[SqlValue],
    ) -> Result<bool, StoreError> {
        let sql = self.dialect().insert_if_absent(spec);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let inserted = stmt.execute(params_from_iter(row.iter()))?;
        Ok(inserted == 1)
    }

    async fn count_rows(&mut self, table: &str) -> Result<i64, StoreError> {
        let sql = self.dialect().count_rows(table);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    async fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::from(e))
    }
}

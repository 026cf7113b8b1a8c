// ABOUTME: Dependency-ordered bulk copy of every catalog table from a source to a destination store
// ABOUTME: Idempotent insert-if-absent writes with foreign-key enforcement suspended for the load

use super::catalog::{validate_dependency_order, TableSpec};
use super::report::{MigrationReport, TableReport};
use super::store::Store;
use super::value::normalize_row;
use crate::error::{MigrateError, Result, StoreError, StoreRole};
use indicatif::ProgressBar;

/// One migration invocation. Owns both handles and releases them when it ends.
pub struct MigrationRun<S: Store, D: Store> {
    source: S,
    destination: D,
    create_schema: bool,
    progress: Option<ProgressBar>,
    report: MigrationReport,
}

impl<S: Store, D: Store> MigrationRun<S, D> {
    pub fn new(source: S, destination: D) -> Self {
        Self {
            source,
            destination,
            create_schema: false,
            progress: None,
            report: MigrationReport::default(),
        }
    }

    /// Create missing destination tables from the catalog before loading
    pub fn create_schema(mut self, enabled: bool) -> Self {
        self.create_schema = enabled;
        self
    }

    /// Advance `progress` by one for every finished table
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the migration over `tables` in the given order.
    ///
    /// Foreign-key enforcement on the destination is disabled for the load and
    /// re-enabled afterwards on every path that returns. Both handles are
    /// closed before this returns.
    pub async fn execute(mut self, tables: &[TableSpec]) -> Result<MigrationReport> {
        let outcome = self.run(tables).await;

        let MigrationRun {
            source,
            destination,
            progress,
            report,
            ..
        } = self;

        if let Some(progress) = progress {
            progress.finish_and_clear();
        }
        release(source, StoreRole::Source).await;
        release(destination, StoreRole::Destination).await;

        outcome.map(|()| report)
    }

    async fn run(&mut self, tables: &[TableSpec]) -> Result<()> {
        validate_dependency_order(tables)?;

        if self.create_schema {
            self.ensure_destination_tables(tables).await?;
        }

        tracing::info!("Disabling foreign-key enforcement on destination");
        self.destination
            .set_foreign_key_checks(false)
            .await
            .map_err(|source| MigrateError::ConstraintToggle {
                action: "disable",
                source,
            })?;

        let loaded = self.load_tables(tables).await;

        tracing::info!("Re-enabling foreign-key enforcement on destination");
        let restored = self.destination.set_foreign_key_checks(true).await;

        match (loaded, restored) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(source)) => Err(MigrateError::ConstraintToggle {
                action: "re-enable",
                source,
            }),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                tracing::error!(
                    "✗ Failed to re-enable foreign-key enforcement after error: {}",
                    restore_err
                );
                Err(e)
            }
        }
    }

    async fn ensure_destination_tables(&mut self, tables: &[TableSpec]) -> Result<()> {
        let dialect = self.destination.dialect();
        tracing::info!("Ensuring {} destination tables exist", tables.len());

        for spec in tables {
            self.destination
                .execute(&dialect.create_table(spec, &spec.name, true))
                .await
                .map_err(|source| MigrateError::SchemaSetup {
                    table: spec.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    async fn load_tables(&mut self, tables: &[TableSpec]) -> Result<()> {
        for (idx, spec) in tables.iter().enumerate() {
            tracing::info!(
                "Table {}/{}: '{}'",
                idx + 1,
                tables.len(),
                spec.name
            );
            if let Some(progress) = &self.progress {
                progress.set_message(spec.name.clone());
            }

            match self.migrate_table(spec).await {
                Ok(table_report) => {
                    tracing::info!(
                        "  ✓ '{}': {} rows read, {} inserted, {} already present",
                        spec.name,
                        table_report.rows_read,
                        table_report.rows_inserted,
                        table_report.rows_skipped
                    );
                    self.report.tables.push(table_report);
                }
                Err(MigrateError::TableMissing { table }) if spec.optional => {
                    tracing::warn!(
                        "⚠ Optional table '{}' does not exist in the source, skipping",
                        table
                    );
                    self.report.missing_optional.push(table);
                }
                Err(e) => return Err(e),
            }

            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }
        Ok(())
    }

    async fn migrate_table(&mut self, spec: &TableSpec) -> Result<TableReport> {
        let columns = self
            .source
            .columns(&spec.name)
            .await
            .map_err(|source| MigrateError::Introspection {
                table: spec.name.clone(),
                source,
            })?;
        if columns.is_empty() {
            return Err(MigrateError::TableMissing {
                table: spec.name.clone(),
            });
        }

        let rows = self
            .source
            .read_rows(spec)
            .await
            .map_err(|source| MigrateError::SourceRead {
                table: spec.name.clone(),
                source,
            })?;

        let mut report = TableReport {
            table: spec.name.clone(),
            rows_read: rows.len(),
            rows_inserted: 0,
            rows_skipped: 0,
        };

        for (row_index, row) in rows.into_iter().enumerate() {
            let row_error = |source: StoreError| MigrateError::RowInsert {
                table: spec.name.clone(),
                row_index,
                source,
            };

            let row = normalize_row(spec, row).map_err(|m| row_error(StoreError(m)))?;
            let inserted = self
                .destination
                .insert_if_absent(spec, &row)
                .await
                .map_err(row_error)?;

            if inserted {
                report.rows_inserted += 1;
            } else {
                report.rows_skipped += 1;
            }
        }

        Ok(report)
    }
}

async fn release<T: Store>(store: T, role: StoreRole) {
    if let Err(e) = store.close().await {
        tracing::warn!("⚠ Failed to close {} handle cleanly: {}", role, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::catalog::{ColumnDef, ColumnType};
    use crate::migration::sql::Dialect;
    use crate::migration::value::SqlValue;
    use crate::sqlite::SqliteStore;

    fn catalog() -> Vec<TableSpec> {
        vec![
            TableSpec::new("teacher").column(ColumnDef::required("full_name", ColumnType::Text)),
            TableSpec::new("grade")
                .reference("teacher_id", "teacher", false)
                .column(ColumnDef::required("is_final", ColumnType::Boolean)),
        ]
    }

    async fn source() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .execute("CREATE TABLE teacher (id INTEGER PRIMARY KEY, full_name TEXT NOT NULL)")
            .await
            .unwrap();
        store
            .execute("CREATE TABLE grade (id INTEGER PRIMARY KEY, teacher_id INTEGER NOT NULL, is_final TEXT)")
            .await
            .unwrap();
        store
            .execute("INSERT INTO teacher VALUES (1, 'Marko'), (2, 'Petra')")
            .await
            .unwrap();
        store
            .execute("INSERT INTO grade VALUES (1, 1, 'true'), (2, 2, '0')")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_flags_are_normalized_on_the_way() {
        let mut destination = SqliteStore::open_in_memory().unwrap();
        for spec in catalog() {
            let sql = Dialect::Sqlite.create_table(&spec, &spec.name, false);
            destination.execute(&sql).await.unwrap();
        }

        let report = MigrationRun::new(source().await, destination)
            .execute(&catalog())
            .await
            .unwrap();
        assert_eq!(report.table("teacher").unwrap().rows_inserted, 2);
        assert_eq!(report.table("grade").unwrap().rows_inserted, 2);
    }

    #[tokio::test]
    async fn test_invalid_order_is_rejected_before_any_write() {
        let mut reversed = catalog();
        reversed.reverse();

        let err = MigrationRun::new(source().await, SqliteStore::open_in_memory().unwrap())
            .create_schema(true)
            .execute(&reversed)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidCatalog(_)));
    }

    #[tokio::test]
    async fn test_malformed_flag_is_row_failure() {
        let mut src = source().await;
        src.execute("INSERT INTO grade VALUES (3, 1, 'perhaps')")
            .await
            .unwrap();

        let err = MigrationRun::new(src, SqliteStore::open_in_memory().unwrap())
            .create_schema(true)
            .execute(&catalog())
            .await
            .unwrap_err();
        match err {
            MigrateError::RowInsert {
                table, row_index, ..
            } => {
                assert_eq!(table, "grade");
                assert_eq!(row_index, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_required_table_aborts() {
        let mut src = SqliteStore::open_in_memory().unwrap();
        src.execute("CREATE TABLE teacher (id INTEGER PRIMARY KEY, full_name TEXT NOT NULL)")
            .await
            .unwrap();

        let report_or_err = MigrationRun::new(src, SqliteStore::open_in_memory().unwrap())
            .create_schema(true)
            .execute(&catalog())
            .await;
        assert!(matches!(
            report_or_err,
            Err(MigrateError::TableMissing { ref table }) if table == "grade"
        ));
    }

    #[test]
    fn test_values_compare_after_normalization() {
        let spec = &catalog()[1];
        let row = normalize_row(
            spec,
            vec![SqlValue::Integer(1), SqlValue::Integer(1), SqlValue::Text("t".into())],
        )
        .unwrap();
        assert_eq!(row[2], SqlValue::Boolean(true));
    }
}

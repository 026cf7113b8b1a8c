// ABOUTME: Migrate command - copy every gradebook table from SQLite to PostgreSQL
// ABOUTME: Prints a per-table summary (or JSON) once the run has released both databases

use super::ReportFormat;
use crate::config::Settings;
use crate::error::StoreRole;
use crate::migration::{default_catalog, MigrationReport, MigrationRun, Store, TableSpec};
use crate::{postgres, sqlite};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Migrate the legacy gradebook into the PostgreSQL destination.
///
/// Tables are copied in dependency order. Rows whose key already exists on
/// the destination are left untouched, so the command can be rerun after a
/// partial failure.
///
/// # Arguments
///
/// * `settings` - Resolved source path and destination connection
/// * `create_schema` - Create missing destination tables before loading
/// * `format` - How to print the final report
///
/// # Errors
///
/// Returns an error naming the failing table if the source cannot be read,
/// a required table is missing, or a row cannot be written.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use gradebook_migrator::commands::{migrate, ReportFormat};
/// # use gradebook_migrator::config::{Overrides, Settings};
/// # async fn example() -> Result<()> {
/// let settings = Settings::load(None, Overrides::default())?;
/// let report = migrate(&settings, true, ReportFormat::Text).await?;
/// println!("{} rows inserted", report.total_inserted());
/// # Ok(())
/// # }
/// ```
pub async fn migrate(
    settings: &Settings,
    create_schema: bool,
    format: ReportFormat,
) -> Result<MigrationReport> {
    tracing::info!("Starting gradebook migration...");
    tracing::info!("  Source: {}", settings.source_path.display());
    tracing::info!("  Destination: {}", settings.destination);

    let source = sqlite::open_read_only(&settings.source_path, StoreRole::Source)?;
    let destination = postgres::open_store(&settings.destination).await?;

    let catalog = default_catalog();
    let report = run_migration(source, destination, &catalog, create_schema).await?;

    print_report(&report, format)?;
    Ok(report)
}

/// Run a migration between any two stores with a progress bar attached
pub async fn run_migration<S: Store, D: Store>(
    source: S,
    destination: D,
    catalog: &[TableSpec],
    create_schema: bool,
) -> Result<MigrationReport> {
    let progress = ProgressBar::new(catalog.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let report = MigrationRun::new(source, destination)
        .create_schema(create_schema)
        .with_progress(progress)
        .execute(catalog)
        .await
        .context("Migration failed")?;

    tracing::info!(
        "✓ Migration complete: {} rows read, {} inserted",
        report.total_read(),
        report.total_inserted()
    );
    Ok(report)
}

fn print_report(report: &MigrationReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => println!("{}", report),
        ReportFormat::Json => super::print_json(report)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{ColumnDef, ColumnType};
    use crate::sqlite::SqliteStore;

    #[tokio::test]
    async fn test_run_migration_between_sqlite_stores() {
        let catalog = vec![TableSpec::new("admin")
            .column(ColumnDef::required("username", ColumnType::Text).unique())];

        let mut source = SqliteStore::open_in_memory().unwrap();
        source
            .execute("CREATE TABLE admin (id INTEGER PRIMARY KEY, username TEXT NOT NULL)")
            .await
            .unwrap();
        source
            .execute("INSERT INTO admin VALUES (1, 'root'), (2, 'office')")
            .await
            .unwrap();

        let report = run_migration(source, SqliteStore::open_in_memory().unwrap(), &catalog, true)
            .await
            .unwrap();
        assert_eq!(report.table("admin").unwrap().rows_inserted, 2);
    }

    #[tokio::test]
    async fn test_migrate_reports_missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            source_path: dir.path().join("absent.db"),
            destination: Default::default(),
        };

        let err = migrate(&settings, false, ReportFormat::Text)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("does not exist"));
    }

    #[test]
    fn test_json_report_prints() {
        assert!(print_report(&MigrationReport::default(), ReportFormat::Json).is_ok());
    }
}

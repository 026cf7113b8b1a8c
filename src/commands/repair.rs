// ABOUTME: Repair command - remove the obsolete column from a legacy table
// ABOUTME: Rebuilds the table on the SQLite source (default) or the PostgreSQL destination

use super::{print_json, ReportFormat};
use crate::config::Settings;
use crate::error::StoreRole;
use crate::migration::{
    default_catalog, find_table, repair_table, RepairOutcome, RepairPlan, Store,
};
use crate::{postgres, sqlite};
use anyhow::{Context, Result};

/// Which store holds the table to repair
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RepairTarget {
    /// The legacy SQLite database file
    Source,
    /// The PostgreSQL destination
    Destination,
}

/// Build the repair plan for a catalog table
pub fn plan_for(table: &str, obsolete_column: &str) -> Result<RepairPlan> {
    let catalog = default_catalog();
    let replacement = find_table(&catalog, table)
        .with_context(|| format!("Table '{}' is not part of the gradebook catalog", table))?;
    Ok(RepairPlan::new(replacement.clone(), obsolete_column))
}

/// Remove `obsolete_column` from `table`, preserving every row.
///
/// Running it again after success reports that the schema is already correct
/// and issues no DDL.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use gradebook_migrator::commands::{repair, RepairTarget, ReportFormat};
/// # use gradebook_migrator::config::{Overrides, Settings};
/// # async fn example() -> Result<()> {
/// let settings = Settings::load(None, Overrides::default())?;
/// repair(&settings, RepairTarget::Source, "student", "class_id", ReportFormat::Text).await?;
/// # Ok(())
/// # }
/// ```
pub async fn repair(
    settings: &Settings,
    target: RepairTarget,
    table: &str,
    obsolete_column: &str,
    format: ReportFormat,
) -> Result<RepairOutcome> {
    let plan = plan_for(table, obsolete_column)?;

    let outcome = match target {
        RepairTarget::Source => {
            let store = sqlite::open_read_write(&settings.source_path, StoreRole::Source)?;
            repair_on(store, &plan).await?
        }
        RepairTarget::Destination => {
            let store = postgres::open_store(&settings.destination).await?;
            repair_on(store, &plan).await?
        }
    };

    report(&outcome, format)?;
    Ok(outcome)
}

/// Run the repair and release the handle whatever the outcome
async fn repair_on<S: Store>(mut store: S, plan: &RepairPlan) -> Result<RepairOutcome> {
    let outcome = repair_table(&mut store, plan).await;

    if let Err(e) = store.close().await {
        tracing::warn!("⚠ Failed to close database handle cleanly: {}", e);
    }

    outcome.with_context(|| format!("Schema repair of '{}' failed", plan.table()))
}

fn report(outcome: &RepairOutcome, format: ReportFormat) -> Result<()> {
    if format == ReportFormat::Json {
        return print_json(outcome);
    }

    match outcome {
        RepairOutcome::AlreadyCorrect { columns } => {
            println!("✓ Schema already correct, nothing to do");
            println!("  Columns: {}", columns.join(", "));
        }
        RepairOutcome::Repaired {
            rows_copied,
            columns,
        } => {
            println!("✓ Table rebuilt, {} rows preserved", rows_copied);
            println!("  Columns: {}", columns.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, Overrides, Settings};
    use rusqlite::Connection;

    #[test]
    fn test_plan_for_catalog_table() {
        let plan = plan_for("student", "class_id").unwrap();
        assert_eq!(plan.table(), "student");
        assert!(plan.replacement.find_column("class_id").is_none());
    }

    #[test]
    fn test_plan_for_unknown_table() {
        let err = plan_for("pupil", "class_id").unwrap_err();
        assert!(err.to_string().contains("not part of the gradebook catalog"));
    }

    #[tokio::test]
    async fn test_repair_command_on_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("school.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE student (
                    id INTEGER PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    full_name TEXT NOT NULL,
                    email TEXT,
                    is_active BOOLEAN NOT NULL,
                    created_at DATETIME,
                    class_id INTEGER,
                    student_number TEXT,
                    date_of_birth DATE
                );
                INSERT INTO student VALUES
                    (1, 'ana', 'x', 'Ana', NULL, 1, NULL, 4, 'S-1', '2010-02-01');",
            )
            .unwrap();
        }

        let settings = Settings::resolve(
            FileConfig::default(),
            Overrides {
                source_path: Some(path.clone()),
                ..Default::default()
            },
        );

        let first = repair(
            &settings,
            RepairTarget::Source,
            "student",
            "class_id",
            ReportFormat::Text,
        )
        .await
        .unwrap();
        assert!(matches!(first, RepairOutcome::Repaired { rows_copied: 1, .. }));

        let second = repair(
            &settings,
            RepairTarget::Source,
            "student",
            "class_id",
            ReportFormat::Json,
        )
        .await
        .unwrap();
        assert!(matches!(second, RepairOutcome::AlreadyCorrect { .. }));
        assert_eq!(first.columns(), second.columns());
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let outcome = RepairOutcome::AlreadyCorrect {
            columns: vec!["id".into(), "full_name".into()],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "already_correct");
        assert_eq!(json["columns"][1], "full_name");
    }
}

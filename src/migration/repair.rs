// ABOUTME: Schema repair that removes an obsolete column by rebuilding its table
// ABOUTME: Runs named stages inside one transaction and reports the last completed stage on failure

use super::catalog::TableSpec;
use super::sql::{shadow_table_name, Dialect};
use super::store::{ColumnDescriptor, Store};
use crate::error::{MigrateError, Result, StoreError};
use crate::utils::validate_identifier;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Named steps of a table rebuild, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStage {
    Introspect,
    CreateShadow,
    CopyRows,
    DropOriginal,
    RenameShadow,
    Verify,
}

impl fmt::Display for RepairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepairStage::Introspect => "introspect",
            RepairStage::CreateShadow => "create shadow table",
            RepairStage::CopyRows => "copy rows",
            RepairStage::DropOriginal => "drop original table",
            RepairStage::RenameShadow => "rename shadow table",
            RepairStage::Verify => "verify",
        };
        write!(f, "{}", name)
    }
}

/// What to remove and what the table must look like afterwards
#[derive(Debug, Clone)]
pub struct RepairPlan {
    pub obsolete_column: String,
    /// Full replacement schema; its name is the table being repaired
    pub replacement: TableSpec,
}

impl RepairPlan {
    pub fn new(replacement: TableSpec, obsolete_column: &str) -> Self {
        Self {
            obsolete_column: obsolete_column.to_string(),
            replacement,
        }
    }

    pub fn table(&self) -> &str {
        &self.replacement.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// The obsolete column was not there; nothing was changed
    AlreadyCorrect { columns: Vec<String> },
    Repaired {
        rows_copied: u64,
        columns: Vec<String>,
    },
}

impl RepairOutcome {
    pub fn columns(&self) -> &[String] {
        match self {
            RepairOutcome::AlreadyCorrect { columns } | RepairOutcome::Repaired { columns, .. } => {
                columns
            }
        }
    }
}

/// Tracks progress through the stages so failures can name where they stopped
struct Pipeline<'a> {
    table: &'a str,
    last_completed: Option<RepairStage>,
}

impl<'a> Pipeline<'a> {
    fn new(table: &'a str) -> Self {
        Self {
            table,
            last_completed: None,
        }
    }

    fn complete(&mut self, stage: RepairStage) {
        tracing::info!("  ✓ {} ({})", stage, self.table);
        self.last_completed = Some(stage);
    }

    fn fail(&self, stage: RepairStage, source: StoreError) -> MigrateError {
        MigrateError::SchemaRepair {
            table: self.table.to_string(),
            failed: stage,
            last_completed: self.last_completed,
            source,
        }
    }
}

fn column_names(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

/// Check the plan against the live table before anything is mutated
fn validate_plan(plan: &RepairPlan, current: &[ColumnDescriptor]) -> Result<()> {
    let invalid = |reason: String| MigrateError::InvalidRepairPlan {
        table: plan.table().to_string(),
        reason,
    };

    validate_identifier(plan.table()).map_err(|e| invalid(e.to_string()))?;
    validate_identifier(&plan.obsolete_column).map_err(|e| invalid(e.to_string()))?;

    if plan.replacement.find_column(&plan.obsolete_column).is_some() {
        return Err(invalid(format!(
            "replacement schema still contains '{}'",
            plan.obsolete_column
        )));
    }
    for key in &plan.replacement.key {
        if plan.replacement.find_column(key).is_none() {
            return Err(invalid(format!("key column '{}' is not in the replacement", key)));
        }
    }

    let existing: HashSet<&str> = current.iter().map(|c| c.name.as_str()).collect();
    for column in &plan.replacement.columns {
        if !column.nullable && !existing.contains(column.name.as_str()) {
            return Err(invalid(format!(
                "NOT NULL column '{}' does not exist yet, copied rows could not fill it",
                column.name
            )));
        }
    }
    for key in &plan.replacement.key {
        if !existing.contains(key.as_str()) {
            return Err(invalid(format!("key column '{}' does not exist on the table", key)));
        }
    }

    Ok(())
}

/// Remove `plan.obsolete_column` from a live table.
///
/// Absent column: returns `AlreadyCorrect` without issuing DDL. Otherwise the
/// table is rebuilt (shadow create, copy surviving columns, drop, rename)
/// inside a single transaction, then re-introspected.
pub async fn repair_table<S: Store>(store: &mut S, plan: &RepairPlan) -> Result<RepairOutcome> {
    let table = plan.table();
    let dialect = store.dialect();
    let mut pipeline = Pipeline::new(table);

    tracing::info!(
        "Checking '{}' for obsolete column '{}' ({})",
        table,
        plan.obsolete_column,
        dialect.name()
    );

    let current = store
        .columns(table)
        .await
        .map_err(|source| MigrateError::Introspection {
            table: table.to_string(),
            source,
        })?;
    if current.is_empty() {
        return Err(MigrateError::Introspection {
            table: table.to_string(),
            source: StoreError::new("table does not exist"),
        });
    }
    pipeline.complete(RepairStage::Introspect);

    if !current.iter().any(|c| c.name == plan.obsolete_column) {
        tracing::info!(
            "✓ '{}' has no '{}' column, schema already correct",
            table,
            plan.obsolete_column
        );
        return Ok(RepairOutcome::AlreadyCorrect {
            columns: column_names(&current),
        });
    }

    validate_plan(plan, &current)?;

    // Surviving columns present today; new replacement columns start out NULL
    let surviving: Vec<&str> = plan
        .replacement
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| current.iter().any(|c| c.name == *name))
        .collect();
    let shadow = shadow_table_name(table);

    // SQLite acts on references to the dropped table while enforcement is on.
    // PostgreSQL refuses to drop a referenced table either way.
    let toggle_foreign_keys = dialect == Dialect::Sqlite;
    if toggle_foreign_keys {
        store
            .set_foreign_key_checks(false)
            .await
            .map_err(|source| MigrateError::ConstraintToggle {
                action: "disable",
                source,
            })?;
    }

    let rebuilt = rebuild(store, plan, &shadow, &surviving, &mut pipeline).await;

    // Re-enabled whether or not the rebuild succeeded
    let restored = if toggle_foreign_keys {
        store.set_foreign_key_checks(true).await
    } else {
        Ok(())
    };

    let rows_copied = rebuilt?;
    restored.map_err(|source| MigrateError::ConstraintToggle {
        action: "re-enable",
        source,
    })?;

    verify(store, plan, &mut pipeline, rows_copied).await
}

/// Re-introspect after commit and compare against the replacement schema
async fn verify<S: Store>(
    store: &mut S,
    plan: &RepairPlan,
    pipeline: &mut Pipeline<'_>,
    rows_copied: u64,
) -> Result<RepairOutcome> {
    let table = plan.table();

    let after = store
        .columns(table)
        .await
        .map_err(|source| pipeline.fail(RepairStage::Verify, source))?;
    let after_names = column_names(&after);
    let expected: Vec<String> = plan
        .replacement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    if after_names != expected {
        return Err(pipeline.fail(
            RepairStage::Verify,
            StoreError::new(format!(
                "expected columns {:?} after rebuild, found {:?}",
                expected, after_names
            )),
        ));
    }
    pipeline.complete(RepairStage::Verify);

    tracing::info!(
        "✓ '{}' rebuilt without '{}': {} rows preserved, columns: {}",
        table,
        plan.obsolete_column,
        rows_copied,
        after_names.join(", ")
    );

    Ok(RepairOutcome::Repaired {
        rows_copied,
        columns: after_names,
    })
}

/// The transactional part: create shadow, copy, drop, rename
async fn rebuild<S: Store>(
    store: &mut S,
    plan: &RepairPlan,
    shadow: &str,
    surviving: &[&str],
    pipeline: &mut Pipeline<'_>,
) -> Result<u64> {
    let table = plan.table();
    let dialect = store.dialect();

    store
        .execute("BEGIN")
        .await
        .map_err(|source| pipeline.fail(RepairStage::CreateShadow, source))?;

    let result = async {
        let original_rows = store
            .count_rows(table)
            .await
            .map_err(|e| (RepairStage::CreateShadow, e))?;

        store
            .execute(&dialect.drop_table(shadow, true))
            .await
            .map_err(|e| (RepairStage::CreateShadow, e))?;
        store
            .execute(&dialect.create_table(&plan.replacement, shadow, false))
            .await
            .map_err(|e| (RepairStage::CreateShadow, e))?;
        pipeline.complete(RepairStage::CreateShadow);

        let copied = store
            .execute(&dialect.copy_rows(table, shadow, surviving))
            .await
            .map_err(|e| (RepairStage::CopyRows, e))?;
        if copied != original_rows as u64 {
            return Err((
                RepairStage::CopyRows,
                StoreError::new(format!(
                    "copied {} rows but the table holds {}",
                    copied, original_rows
                )),
            ));
        }
        pipeline.complete(RepairStage::CopyRows);

        store
            .execute(&dialect.drop_table(table, false))
            .await
            .map_err(|e| (RepairStage::DropOriginal, e))?;
        pipeline.complete(RepairStage::DropOriginal);

        store
            .execute(&dialect.rename_table(shadow, table))
            .await
            .map_err(|e| (RepairStage::RenameShadow, e))?;
        for sql in dialect.rename_constraints(&plan.replacement, shadow, table) {
            store
                .execute(&sql)
                .await
                .map_err(|e| (RepairStage::RenameShadow, e))?;
        }

        store
            .execute("COMMIT")
            .await
            .map_err(|e| (RepairStage::RenameShadow, e))?;
        pipeline.complete(RepairStage::RenameShadow);

        Ok::<u64, (RepairStage, StoreError)>(copied)
    }
    .await;

    match result {
        Ok(copied) => Ok(copied),
        Err((stage, source)) => {
            if let Err(e) = store.execute("ROLLBACK").await {
                tracing::warn!("⚠ Rollback of '{}' repair failed: {}", table, e);
            } else {
                tracing::warn!("⚠ Repair of '{}' rolled back after failing to {}", table, stage);
            }
            Err(pipeline.fail(stage, source))
        }
    }
}

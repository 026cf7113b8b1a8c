// ABOUTME: Verify command implementation - Compare row counts after a migration
// ABOUTME: Every catalog table must hold at least as many rows on the destination as in the source

use super::{print_json, ReportFormat};
use crate::config::Settings;
use crate::error::StoreRole;
use crate::migration::{default_catalog, Store, TableSpec};
use crate::{postgres, sqlite};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Row counts of one table on both sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountComparison {
    pub table: String,
    /// None when the table is absent from the source
    pub source_rows: Option<i64>,
    /// None when the table is absent from the destination
    pub destination_rows: Option<i64>,
    pub optional: bool,
}

impl CountComparison {
    /// The destination may hold extra rows written outside the migration
    pub fn is_valid(&self) -> bool {
        match (self.source_rows, self.destination_rows) {
            (None, _) => self.optional,
            (Some(_), None) => false,
            (Some(source), Some(destination)) => destination >= source,
        }
    }
}

/// Compare per-table row counts between the source and the destination.
///
/// This command is read-only on both sides.
///
/// # Errors
///
/// Returns an error if either database cannot be opened or if any table
/// holds fewer rows on the destination than in the source.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use gradebook_migrator::commands::{verify, ReportFormat};
/// # use gradebook_migrator::config::{Overrides, Settings};
/// # async fn example() -> Result<()> {
/// let settings = Settings::load(None, Overrides::default())?;
/// verify(&settings, ReportFormat::Text).await?;
/// # Ok(())
/// # }
/// ```
pub async fn verify(settings: &Settings, format: ReportFormat) -> Result<()> {
    tracing::info!("Starting row count verification...");

    let mut source = sqlite::open_read_only(&settings.source_path, StoreRole::Source)?;
    let mut destination = postgres::open_store(&settings.destination).await?;

    let catalog = default_catalog();
    let compared = compare_counts(&mut source, &mut destination, &catalog).await;

    if let Err(e) = source.close().await {
        tracing::warn!("⚠ Failed to close source handle cleanly: {}", e);
    }
    if let Err(e) = destination.close().await {
        tracing::warn!("⚠ Failed to close destination handle cleanly: {}", e);
    }

    let compared = compared?;
    if format == ReportFormat::Json {
        print_json(&compared)?;
    }
    summarize(&compared)
}

/// Count rows of every catalog table on both stores
pub async fn compare_counts<S: Store, D: Store>(
    source: &mut S,
    destination: &mut D,
    catalog: &[TableSpec],
) -> Result<Vec<CountComparison>> {
    let progress = ProgressBar::new(catalog.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let mut results = Vec::with_capacity(catalog.len());
    for spec in catalog {
        progress.set_message(spec.name.clone());
        let source_rows = count_if_present(source, &spec.name)
            .await
            .with_context(|| format!("Failed to count '{}' in source", spec.name))?;
        let destination_rows = count_if_present(destination, &spec.name)
            .await
            .with_context(|| format!("Failed to count '{}' in destination", spec.name))?;

        results.push(CountComparison {
            table: spec.name.clone(),
            source_rows,
            destination_rows,
            optional: spec.optional,
        });
        progress.inc(1);
    }
    progress.finish_with_message("Verification complete");

    Ok(results)
}

async fn count_if_present<S: Store>(store: &mut S, table: &str) -> Result<Option<i64>> {
    if !store.table_exists(table).await? {
        return Ok(None);
    }
    Ok(Some(store.count_rows(table).await?))
}

fn summarize(results: &[CountComparison]) -> Result<()> {
    let mut mismatches = 0;

    for r in results {
        match (r.source_rows, r.destination_rows) {
            (None, _) if r.optional => {
                tracing::warn!("  ⚠ {}: optional table absent from source, skipped", r.table);
            }
            (Some(source), Some(destination)) if r.is_valid() => {
                tracing::info!("  ✓ {}: {} source rows, {} destination rows", r.table, source, destination);
            }
            (source, destination) => {
                tracing::error!(
                    "  ✗ {}: source={}, destination={}",
                    r.table,
                    describe(source),
                    describe(destination)
                );
                mismatches += 1;
            }
        }
    }

    tracing::info!("Total tables: {}", results.len());
    tracing::info!("✓ Matches: {}", results.len() - mismatches);
    tracing::info!("✗ Mismatches: {}", mismatches);

    if mismatches > 0 {
        bail!("{} table(s) are missing rows on the destination", mismatches);
    }
    tracing::info!("✓ All tables verified");
    Ok(())
}

fn describe(count: Option<i64>) -> String {
    count.map_or_else(|| "missing".to_string(), |c| c.to_string())
}

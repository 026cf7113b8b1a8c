// ABOUTME: Per-table results of a migration run
// ABOUTME: Rendered as the human-readable summary or serialized as JSON

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows_read: usize,
    pub rows_inserted: usize,
    /// Rows whose key already existed on the destination
    pub rows_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
    /// Optional tables absent from the source
    pub missing_optional: Vec<String>,
}

impl MigrationReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn total_read(&self) -> usize {
        self.tables.iter().map(|t| t.rows_read).sum()
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.rows_inserted).sum()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<28} {:>10} {:>10} {:>10}",
            "Table", "Read", "Inserted", "Existing"
        )?;
        writeln!(f, "{}", "─".repeat(61))?;
        for t in &self.tables {
            writeln!(
                f,
                "{:<28} {:>10} {:>10} {:>10}",
                t.table, t.rows_read, t.rows_inserted, t.rows_skipped
            )?;
        }
        for name in &self.missing_optional {
            writeln!(f, "{:<28} {:>10}", name, "missing")?;
        }
        writeln!(f, "{}", "─".repeat(61))?;
        write!(
            f,
            "Total: {} rows read, {} inserted across {} tables",
            self.total_read(),
            self.total_inserted(),
            self.tables.len()
        )
    }
}

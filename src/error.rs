// ABOUTME: Error types for schema repair and cross-engine migration
// ABOUTME: Store adapters raise StoreError, pipelines wrap it with table/stage/row context

use crate::migration::repair::RepairStage;
use std::fmt;

/// Result alias used by the library pipelines
pub type Result<T, E = MigrateError> = std::result::Result<T, E>;

/// Raw failure reported by a store adapter, without pipeline context
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        // The database error carries the server message (constraint name, detail)
        match err.as_db_error() {
            Some(db) => match db.detail() {
                Some(detail) => Self(format!("{}: {}", db.message(), detail)),
                None => Self(db.message().to_string()),
            },
            None => Self(err.to_string()),
        }
    }
}

/// Which side of a run a handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Source,
    Destination,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreRole::Source => write!(f, "source"),
            StoreRole::Destination => write!(f, "destination"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("failed to introspect table '{table}': {source}")]
    Introspection { table: String, source: StoreError },

    #[error(
        "schema repair of '{table}' failed during {failed} (last completed stage: {}): {source}",
        describe_stage(.last_completed)
    )]
    SchemaRepair {
        table: String,
        failed: RepairStage,
        last_completed: Option<RepairStage>,
        source: StoreError,
    },

    #[error("invalid repair plan for '{table}': {reason}")]
    InvalidRepairPlan { table: String, reason: String },

    #[error("table '{table}' does not exist in the source")]
    TableMissing { table: String },

    #[error("failed to read table '{table}' from source: {source}")]
    SourceRead { table: String, source: StoreError },

    #[error("failed to create table '{table}' on destination: {source}")]
    SchemaSetup { table: String, source: StoreError },

    #[error("destination rejected row {row_index} of table '{table}': {source}")]
    RowInsert {
        table: String,
        row_index: usize,
        source: StoreError,
    },

    #[error("failed to {action} foreign-key enforcement: {source}")]
    ConstraintToggle {
        action: &'static str,
        source: StoreError,
    },

    #[error("{store} connection failure: {message}")]
    Connection { store: StoreRole, message: String },

    #[error("invalid table catalog: {0}")]
    InvalidCatalog(String),
}

fn describe_stage(stage: &Option<RepairStage>) -> String {
    match stage {
        Some(stage) => stage.to_string(),
        None => "none".to_string(),
    }
}

impl MigrateError {
    /// Table the failure is attributed to, when there is one
    pub fn table(&self) -> Option<&str> {
        match self {
            MigrateError::Introspection { table, .. }
            | MigrateError::SchemaRepair { table, .. }
            | MigrateError::InvalidRepairPlan { table, .. }
            | MigrateError::TableMissing { table }
            | MigrateError::SourceRead { table, .. }
            | MigrateError::SchemaSetup { table, .. }
            | MigrateError::RowInsert { table, .. } => Some(table),
            MigrateError::ConstraintToggle { .. }
            | MigrateError::Connection { .. }
            | MigrateError::InvalidCatalog(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_repair_message_names_last_stage() {
        let err = MigrateError::SchemaRepair {
            table: "student".to_string(),
            failed: RepairStage::CopyRows,
            last_completed: Some(RepairStage::CreateShadow),
            source: StoreError::new("UNIQUE constraint failed"),
        };
        let msg = err.to_string();
        assert!(msg.contains("copy rows"));
        assert!(msg.contains("last completed stage: create shadow table"));
        assert_eq!(err.table(), Some("student"));
    }

    #[test]
    fn test_schema_repair_message_without_completed_stage() {
        let err = MigrateError::SchemaRepair {
            table: "student".to_string(),
            failed: RepairStage::Introspect,
            last_completed: None,
            source: StoreError::new("disk I/O error"),
        };
        assert!(err.to_string().contains("last completed stage: none"));
    }

    #[test]
    fn test_row_insert_message_has_context() {
        let err = MigrateError::RowInsert {
            table: "grade".to_string(),
            row_index: 17,
            source: StoreError::new("NOT NULL constraint failed: grade.value"),
        };
        assert_eq!(
            err.to_string(),
            "destination rejected row 17 of table 'grade': NOT NULL constraint failed: grade.value"
        );
    }

    #[test]
    fn test_connection_error_has_no_table() {
        let err = MigrateError::Connection {
            store: StoreRole::Destination,
            message: "refused".to_string(),
        };
        assert_eq!(err.table(), None);
        assert_eq!(err.to_string(), "destination connection failure: refused");
    }
}

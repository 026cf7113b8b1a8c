// ABOUTME: SQLite access for the legacy gradebook database
// ABOUTME: Opens database files read-only or read-write and exposes them as a Store

pub mod store;

pub use store::SqliteStore;

use crate::error::{MigrateError, StoreRole};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Validate that a SQLite source path points at an existing file
///
/// SQLite would silently create an empty database for a mistyped path when
/// opened read-write, so the path is checked before every open.
pub fn validate_sqlite_path(path: &Path) -> Result<(), MigrateError> {
    if path.as_os_str().is_empty() {
        return Err(MigrateError::Connection {
            store: StoreRole::Source,
            message: "SQLite path cannot be empty".to_string(),
        });
    }
    if !path.is_file() {
        return Err(MigrateError::Connection {
            store: StoreRole::Source,
            message: format!(
                "SQLite database '{}' does not exist or is not a file",
                path.display()
            ),
        });
    }
    Ok(())
}

/// Open a SQLite database for reading only
pub fn open_read_only(path: &Path, role: StoreRole) -> Result<SqliteStore, MigrateError> {
    validate_sqlite_path(path)?;
    tracing::info!("Opening SQLite database {} (read-only)", path.display());

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| MigrateError::Connection {
        store: role,
        message: format!("failed to open '{}': {}", path.display(), e),
    })?;

    SqliteStore::from_connection(conn).map_err(|e| MigrateError::Connection {
        store: role,
        message: e.to_string(),
    })
}

/// Open an existing SQLite database for reading and writing
pub fn open_read_write(path: &Path, role: StoreRole) -> Result<SqliteStore, MigrateError> {
    validate_sqlite_path(path)?;
    tracing::info!("Opening SQLite database {}", path.display());

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| MigrateError::Connection {
        store: role,
        message: format!("failed to open '{}': {}", path.display(), e),
    })?;

    SqliteStore::from_connection(conn).map_err(|e| MigrateError::Connection {
        store: role,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_connection_failure() {
        let err = open_read_only(Path::new("/nonexistent/school.db"), StoreRole::Source)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            MigrateError::Connection {
                store: StoreRole::Source,
                ..
            }
        ));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(validate_sqlite_path(Path::new("")).is_err());
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_sqlite_path(dir.path()).is_err());
    }
}

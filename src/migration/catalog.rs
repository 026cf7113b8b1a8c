// ABOUTME: Table catalog describing every gradebook table in foreign-key dependency order
// ABOUTME: Provides TableSpec definitions and an independent check of the ordering invariant

use crate::error::{MigrateError, Result};
use crate::utils::validate_identifier;
use std::collections::{HashMap, HashSet};

/// Logical column type, rendered per dialect and used to normalize values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Real,
    Text,
    Boolean,
    Timestamp,
    Date,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
}

impl ColumnDef {
    pub fn required(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            unique: false,
        }
    }

    pub fn nullable(name: &str, column_type: ColumnType) -> Self {
        Self {
            nullable: true,
            ..Self::required(name, column_type)
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// One table to migrate: ordered columns, key columns and outgoing references
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Primary/unique key used by insert-if-absent
    pub key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Older source generations may not have this table at all
    pub optional: bool,
}

impl TableSpec {
    /// Start a table keyed on an `id INTEGER` column
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: vec![ColumnDef::required("id", ColumnType::Integer)],
            key: vec!["id".to_string()],
            foreign_keys: Vec::new(),
            optional: false,
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a column holding a reference to `table.id`
    pub fn reference(mut self, column: &str, table: &str, nullable: bool) -> Self {
        self.columns.push(if nullable {
            ColumnDef::nullable(column, ColumnType::Integer)
        } else {
            ColumnDef::required(column, ColumnType::Integer)
        });
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            references_table: table.to_string(),
            references_column: "id".to_string(),
        });
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

fn user_account(name: &str) -> TableSpec {
    TableSpec::new(name)
        .column(ColumnDef::required("username", ColumnType::Text).unique())
        .column(ColumnDef::required("password_hash", ColumnType::Text))
        .column(ColumnDef::required("full_name", ColumnType::Text))
        .column(ColumnDef::nullable("email", ColumnType::Text))
        .column(ColumnDef::required("is_active", ColumnType::Boolean))
        .column(ColumnDef::nullable("created_at", ColumnType::Timestamp))
}

/// The gradebook tables in dependency order.
///
/// A table only references tables listed before it, or itself through a
/// nullable column. Reordering must keep `validate_dependency_order` passing.
pub fn default_catalog() -> Vec<TableSpec> {
    vec![
        user_account("admin"),
        user_account("teacher"),
        user_account("student")
            .column(ColumnDef::nullable("student_number", ColumnType::Text).unique())
            .column(ColumnDef::nullable("date_of_birth", ColumnType::Date)),
        TableSpec::new("academic_term")
            .column(ColumnDef::required("name", ColumnType::Text))
            .column(ColumnDef::required("start_date", ColumnType::Date))
            .column(ColumnDef::required("end_date", ColumnType::Date))
            .column(ColumnDef::required("is_current", ColumnType::Boolean)),
        TableSpec::new("subject")
            .column(ColumnDef::required("name", ColumnType::Text))
            .column(ColumnDef::nullable("code", ColumnType::Text).unique())
            .column(ColumnDef::nullable("description", ColumnType::Text)),
        TableSpec::new("grade_type")
            .column(ColumnDef::required("name", ColumnType::Text).unique())
            .column(ColumnDef::required("weight", ColumnType::Real)),
        TableSpec::new("class")
            .column(ColumnDef::required("name", ColumnType::Text))
            .reference("academic_term_id", "academic_term", false)
            .reference("homeroom_teacher_id", "teacher", true),
        TableSpec::new("class_enrollment")
            .reference("class_id", "class", false)
            .reference("student_id", "student", false)
            .column(ColumnDef::nullable("enrolled_at", ColumnType::Timestamp)),
        TableSpec::new("teaching_assignment")
            .reference("teacher_id", "teacher", false)
            .reference("subject_id", "subject", false)
            .reference("class_id", "class", false)
            .reference("academic_term_id", "academic_term", false),
        TableSpec::new("grade")
            .reference("student_id", "student", false)
            .reference("subject_id", "subject", false)
            .reference("grade_type_id", "grade_type", false)
            .reference("teacher_id", "teacher", true)
            .reference("academic_term_id", "academic_term", false)
            .column(ColumnDef::required("value", ColumnType::Real))
            .column(ColumnDef::nullable("comment", ColumnType::Text))
            .column(ColumnDef::required("is_final", ColumnType::Boolean))
            .column(ColumnDef::nullable("created_at", ColumnType::Timestamp)),
        TableSpec::new("learning_outcome")
            .reference("subject_id", "subject", false)
            .reference("parent_id", "learning_outcome", true)
            .column(ColumnDef::required("code", ColumnType::Text))
            .column(ColumnDef::required("description", ColumnType::Text)),
        TableSpec::new("student_learning_outcome")
            .reference("student_id", "student", false)
            .reference("learning_outcome_id", "learning_outcome", false)
            .reference("academic_term_id", "academic_term", true)
            .column(ColumnDef::required("achieved", ColumnType::Boolean))
            .column(ColumnDef::nullable("assessed_at", ColumnType::Timestamp)),
        TableSpec::new("passing_grade")
            .reference("subject_id", "subject", false)
            .reference("academic_term_id", "academic_term", false)
            .column(ColumnDef::required("min_value", ColumnType::Real))
            .optional(),
    ]
}

/// Table and column removed by the default schema repair
pub const LEGACY_TABLE: &str = "student";
pub const LEGACY_COLUMN: &str = "class_id";

/// Look up a table in a catalog by name
pub fn find_table<'a>(catalog: &'a [TableSpec], name: &str) -> Option<&'a TableSpec> {
    catalog.iter().find(|t| t.name == name)
}

/// Check the ordering invariant of a catalog.
///
/// Every foreign key must point at a table earlier in the list, or at the
/// same table through a nullable column. Names must be unique, valid
/// identifiers and keys must name declared columns.
pub fn validate_dependency_order(catalog: &[TableSpec]) -> Result<()> {
    let mut seen: HashMap<&str, &TableSpec> = HashMap::new();

    for table in catalog {
        validate_identifier(&table.name).map_err(|e| MigrateError::InvalidCatalog(e.to_string()))?;

        if seen.contains_key(table.name.as_str()) {
            return Err(MigrateError::InvalidCatalog(format!(
                "table '{}' is listed twice",
                table.name
            )));
        }

        let mut columns = HashSet::new();
        for column in &table.columns {
            validate_identifier(&column.name)
                .map_err(|e| MigrateError::InvalidCatalog(e.to_string()))?;
            if !columns.insert(column.name.as_str()) {
                return Err(MigrateError::InvalidCatalog(format!(
                    "column '{}.{}' is declared twice",
                    table.name, column.name
                )));
            }
        }

        if table.key.is_empty() {
            return Err(MigrateError::InvalidCatalog(format!(
                "table '{}' has no key columns",
                table.name
            )));
        }
        for key in &table.key {
            if !columns.contains(key.as_str()) {
                return Err(MigrateError::InvalidCatalog(format!(
                    "key column '{}.{}' is not declared",
                    table.name, key
                )));
            }
        }

        for fk in &table.foreign_keys {
            let column = table.find_column(&fk.column).ok_or_else(|| {
                MigrateError::InvalidCatalog(format!(
                    "foreign key column '{}.{}' is not declared",
                    table.name, fk.column
                ))
            })?;

            let referenced = if fk.references_table == table.name {
                if !column.nullable {
                    return Err(MigrateError::InvalidCatalog(format!(
                        "self reference '{}.{}' must be nullable",
                        table.name, fk.column
                    )));
                }
                table
            } else {
                *seen.get(fk.references_table.as_str()).ok_or_else(|| {
                    MigrateError::InvalidCatalog(format!(
                        "'{}.{}' references '{}', which is not listed before it",
                        table.name, fk.column, fk.references_table
                    ))
                })?
            };

            if referenced.find_column(&fk.references_column).is_none() {
                return Err(MigrateError::InvalidCatalog(format!(
                    "'{}.{}' references missing column '{}.{}'",
                    table.name, fk.column, fk.references_table, fk.references_column
                )));
            }
        }

        seen.insert(table.name.as_str(), table);
    }

    Ok(())
}

// ABOUTME: SQL rendering for the two supported engines
// ABOUTME: Builds DDL, insert-if-absent, shadow-copy and constraint-toggle statements per dialect

use super::catalog::{ColumnDef, ColumnType, TableSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// Quote an identifier. Callers validate identifiers first, embedded quotes are still doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "SQLite",
            Dialect::Postgres => "PostgreSQL",
        }
    }

    pub fn column_type(&self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::Integer) => "INTEGER",
            (Dialect::Sqlite, ColumnType::BigInt) => "INTEGER",
            (Dialect::Postgres, ColumnType::BigInt) => "BIGINT",
            (Dialect::Sqlite, ColumnType::Real) => "REAL",
            (Dialect::Postgres, ColumnType::Real) => "DOUBLE PRECISION",
            (_, ColumnType::Text) => "TEXT",
            (_, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::Sqlite, ColumnType::Timestamp) => "DATETIME",
            (Dialect::Postgres, ColumnType::Timestamp) => "TIMESTAMP",
            (_, ColumnType::Date) => "DATE",
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    ///
    /// PostgreSQL receives dates and timestamps as text and casts them server side.
    pub fn placeholder(&self, index: usize, column_type: ColumnType) -> String {
        match (self, column_type) {
            (Dialect::Sqlite, _) => format!("?{}", index),
            (Dialect::Postgres, ColumnType::Timestamp) => format!("${}::text::timestamp", index),
            (Dialect::Postgres, ColumnType::Date) => format!("${}::text::date", index),
            (Dialect::Postgres, _) => format!("${}", index),
        }
    }

    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut def = format!(
            "{} {}",
            quote_ident(&column.name),
            self.column_type(column.column_type)
        );
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if column.unique {
            def.push_str(" UNIQUE");
        }
        def
    }

    /// `CREATE TABLE` for a spec, optionally under another name (shadow tables)
    pub fn create_table(&self, spec: &TableSpec, table_name: &str, if_not_exists: bool) -> String {
        let mut parts: Vec<String> = spec
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        parts.push(format!(
            "PRIMARY KEY ({})",
            quoted_list(spec.key.iter().map(String::as_str))
        ));

        for fk in &spec.foreign_keys {
            // Self references name the catalog table, not `table_name`, so a
            // shadow table points at its final name once renamed
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&fk.column),
                quote_ident(&fk.references_table),
                quote_ident(&fk.references_column)
            ));
        }

        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(table_name),
            parts.join(", ")
        )
    }

    /// Insert that silently skips rows whose key already exists
    pub fn insert_if_absent(&self, spec: &TableSpec) -> String {
        let placeholders: Vec<String> = spec
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| self.placeholder(i + 1, c.column_type))
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            quote_ident(&spec.name),
            quoted_list(spec.columns.iter().map(|c| c.name.as_str())),
            placeholders.join(", "),
            quoted_list(spec.key.iter().map(String::as_str))
        )
    }

    /// Full-table scan in spec column order, ordered by key for stable row indices
    pub fn select_all(&self, spec: &TableSpec) -> String {
        let columns: Vec<String> = spec
            .columns
            .iter()
            .map(|c| match (self, c.column_type) {
                (Dialect::Postgres, ColumnType::Integer | ColumnType::BigInt) => {
                    format!("{}::bigint", quote_ident(&c.name))
                }
                (Dialect::Postgres, ColumnType::Real) => {
                    format!("{}::float8", quote_ident(&c.name))
                }
                (Dialect::Postgres, ColumnType::Boolean) => {
                    format!("{}::boolean", quote_ident(&c.name))
                }
                (Dialect::Postgres, _) => format!("{}::text", quote_ident(&c.name)),
                (Dialect::Sqlite, _) => quote_ident(&c.name),
            })
            .collect();

        format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote_ident(&spec.name),
            quoted_list(spec.key.iter().map(String::as_str))
        )
    }

    pub fn count_rows(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(table))
    }

    pub fn copy_rows(&self, from: &str, to: &str, columns: &[&str]) -> String {
        let list = quoted_list(columns.iter().copied());
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(to),
            list,
            list,
            quote_ident(from)
        )
    }

    pub fn drop_table(&self, table: &str, if_exists: bool) -> String {
        format!(
            "DROP TABLE {}{}",
            if if_exists { "IF EXISTS " } else { "" },
            quote_ident(table)
        )
    }

    pub fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(from),
            quote_ident(to)
        )
    }

    /// Renames the constraints a table was created with under `from` to the
    /// names PostgreSQL would have generated under `to`. SQLite constraints
    /// are unnamed, so nothing is needed there.
    pub fn rename_constraints(&self, spec: &TableSpec, from: &str, to: &str) -> Vec<String> {
        if *self == Dialect::Sqlite {
            return Vec::new();
        }

        let mut suffixes = vec!["pkey".to_string()];
        suffixes.extend(
            spec.columns
                .iter()
                .filter(|c| c.unique)
                .map(|c| format!("{}_key", c.name)),
        );
        suffixes.extend(spec.foreign_keys.iter().map(|fk| format!("{}_fkey", fk.column)));

        suffixes
            .iter()
            .map(|suffix| {
                format!(
                    "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
                    quote_ident(to),
                    quote_ident(&format!("{}_{}", from, suffix)),
                    quote_ident(&format!("{}_{}", to, suffix))
                )
            })
            .collect()
    }

    /// Statement switching foreign-key enforcement for the current connection/session
    pub fn foreign_key_checks(&self, enabled: bool) -> &'static str {
        match (self, enabled) {
            (Dialect::Sqlite, true) => "PRAGMA foreign_keys = ON",
            (Dialect::Sqlite, false) => "PRAGMA foreign_keys = OFF",
            (Dialect::Postgres, true) => "SET session_replication_role = DEFAULT",
            (Dialect::Postgres, false) => "SET session_replication_role = replica",
        }
    }
}

/// Name of the temporary table a schema repair builds
pub fn shadow_table_name(table: &str) -> String {
    format!("{}__shadow", table)
}

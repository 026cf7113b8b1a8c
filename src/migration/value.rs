// ABOUTME: Engine-neutral cell values read from and written to the stores
// ABOUTME: Normalizes source values (boolean flags, numeric text) to each column's declared type

use super::catalog::{ColumnType, TableSpec};
use serde::Serialize;
use std::fmt;

/// One cell as it travels from source to destination
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

/// A full row, in the column order of its TableSpec
pub type Row = Vec<SqlValue>;

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
            SqlValue::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "'{}'", s),
            SqlValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Coerce a value to the representation expected for `column_type`.
///
/// SQLite has no boolean type, so legacy flag columns hold 0/1 or text such
/// as "true"/"False". Those become `Boolean`. NULL passes through; the
/// destination enforces nullability itself.
pub fn normalize(value: SqlValue, column_type: ColumnType) -> Result<SqlValue, String> {
    use SqlValue::*;

    let normalized = match (column_type, value) {
        (_, Null) => Null,

        (ColumnType::Boolean, Boolean(b)) => Boolean(b),
        (ColumnType::Boolean, Integer(i)) => Boolean(i != 0),
        (ColumnType::Boolean, Real(r)) if r == 0.0 || r == 1.0 => Boolean(r != 0.0),
        (ColumnType::Boolean, Text(s)) => Boolean(parse_flag(&s)?),

        (ColumnType::Integer | ColumnType::BigInt, Integer(i)) => Integer(i),
        (ColumnType::Integer | ColumnType::BigInt, Boolean(b)) => Integer(b as i64),
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
        (ColumnType::Integer | ColumnType::BigInt, Real(r))
            if r.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&r) =>
        {
            Integer(r as i64)
        }
        (ColumnType::Integer | ColumnType::BigInt, Text(s)) => Integer(
            s.trim()
                .parse::<i64>()
                .map_err(|_| format!("'{}' is not an integer", s))?,
        ),

        (ColumnType::Real, Real(r)) => Real(r),
        (ColumnType::Real, Integer(i)) => Real(i as f64),
        (ColumnType::Real, Text(s)) => Real(
            s.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", s))?,
        ),

        (ColumnType::Text, Text(s)) => Text(s),
        (ColumnType::Text, Integer(i)) => Text(i.to_string()),
        (ColumnType::Text, Real(r)) => Text(r.to_string()),
        (ColumnType::Text, Blob(b)) => {
            Text(String::from_utf8(b).map_err(|_| "blob is not valid UTF-8 text".to_string())?)
        }

        // Dates stay textual, the destination parses them
        (ColumnType::Timestamp | ColumnType::Date, Text(s)) => Text(s),

        (column_type, other) => {
            return Err(format!(
                "cannot store {} value {} in a {:?} column",
                other.kind(),
                other,
                column_type
            ))
        }
    };

    Ok(normalized)
}

fn parse_flag(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        _ => Err(format!("'{}' is not a boolean flag", text)),
    }
}

/// Normalize every value of a source row against its table's column types
pub fn normalize_row(spec: &TableSpec, row: Row) -> Result<Row, String> {
    if row.len() != spec.columns.len() {
        return Err(format!(
            "row has {} values but '{}' has {} columns",
            row.len(),
            spec.name,
            spec.columns.len()
        ));
    }

    row.into_iter()
        .zip(&spec.columns)
        .map(|(value, column)| {
            normalize(value, column.column_type).map_err(|e| format!("column '{}': {}", column.name, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::catalog::ColumnDef;

    #[test]
    fn test_boolean_flags_from_integers_and_text() {
        assert_eq!(normalize(SqlValue::Integer(1), ColumnType::Boolean), Ok(SqlValue::Boolean(true)));
        assert_eq!(normalize(SqlValue::Integer(0), ColumnType::Boolean), Ok(SqlValue::Boolean(false)));
        assert_eq!(
            normalize(SqlValue::Text("True".into()), ColumnType::Boolean),
            Ok(SqlValue::Boolean(true))
        );
        assert_eq!(
            normalize(SqlValue::Text(" f ".into()), ColumnType::Boolean),
            Ok(SqlValue::Boolean(false))
        );
        assert!(normalize(SqlValue::Text("maybe".into()), ColumnType::Boolean).is_err());
    }

    #[test]
    fn test_null_passes_through_any_type() {
        for ty in [ColumnType::Integer, ColumnType::Boolean, ColumnType::Timestamp] {
            assert_eq!(normalize(SqlValue::Null, ty), Ok(SqlValue::Null));
        }
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(
            normalize(SqlValue::Text(" 42 ".into()), ColumnType::Integer),
            Ok(SqlValue::Integer(42))
        );
        assert_eq!(normalize(SqlValue::Real(3.0), ColumnType::Integer), Ok(SqlValue::Integer(3)));
        assert!(normalize(SqlValue::Real(3.5), ColumnType::Integer).is_err());
        assert!(normalize(SqlValue::Real(1e30), ColumnType::Integer).is_err());
        assert!(normalize(SqlValue::Real(-1e30), ColumnType::BigInt).is_err());
        assert!(normalize(SqlValue::Real(9_223_372_036_854_775_808.0), ColumnType::BigInt).is_err());
        assert_eq!(
            normalize(SqlValue::Real(-9_223_372_036_854_775_808.0), ColumnType::BigInt),
            Ok(SqlValue::Integer(i64::MIN))
        );
        assert_eq!(normalize(SqlValue::Integer(4), ColumnType::Real), Ok(SqlValue::Real(4.0)));
        assert!(normalize(SqlValue::Text("four".into()), ColumnType::Real).is_err());
    }

    #[test]
    fn test_blob_into_date_is_rejected() {
        let err = normalize(SqlValue::Blob(vec![1, 2]), ColumnType::Date).unwrap_err();
        assert!(err.contains("blob"));
    }

    #[test]
    fn test_normalize_row_reports_column() {
        let spec = TableSpec::new("flags").column(ColumnDef::required("enabled", ColumnType::Boolean));

        let row = normalize_row(&spec, vec![SqlValue::Integer(7), SqlValue::Integer(1)]).unwrap();
        assert_eq!(row, vec![SqlValue::Integer(7), SqlValue::Boolean(true)]);

        let err = normalize_row(&spec, vec![SqlValue::Integer(7), SqlValue::Text("x".into())])
            .unwrap_err();
        assert!(err.starts_with("column 'enabled'"));

        assert!(normalize_row(&spec, vec![SqlValue::Integer(7)]).is_err());
    }
}

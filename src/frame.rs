//! In-memory tabular frames moved between the source database and the embedded store.
//!
//! A [`Frame`] is deliberately small: a table name, typed columns and rows of [`Value`]s.  Frames
//! are produced by [`crate::extract`] and consumed by [`crate::load`], so the type only needs to
//! describe what both ends agree on.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// Logical column type shared by the extractor and the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// `BOOLEAN` values.
    Boolean,
    /// Signed 64-bit integers.
    Integer,
    /// 64-bit floating point numbers, also used for decimals.
    Double,
    /// Free text.
    Text,
    /// Calendar dates without a time component.
    Date,
    /// Date and time without a timezone.
    Timestamp,
}

impl ColumnType {
    /// Returns the DuckDB type used when the column is materialized in the store.
    pub fn duckdb_type(self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "VARCHAR",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Maps a MySQL type name, as reported by the driver, onto a column type.
    ///
    /// Unknown types fall back to [`ColumnType::Text`] so that every column can be carried over.
    pub fn from_mysql(type_name: &str) -> Self {
        let upper = type_name.to_ascii_uppercase();
        let base = upper.split_whitespace().next().unwrap_or_default();
        match base {
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
                ColumnType::Integer
            }
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "NUMERIC" => ColumnType::Double,
            "DATE" => ColumnType::Date,
            "DATETIME" | "TIMESTAMP" => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }
}

/// A single cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns whether the value may be stored in a column of the given type.
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Value::Null, _)
                | (Value::Boolean(_), ColumnType::Boolean)
                | (Value::Integer(_), ColumnType::Integer)
                | (Value::Double(_), ColumnType::Double)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Date(_), ColumnType::Date)
                | (Value::Timestamp(_), ColumnType::Timestamp)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Named, typed column of a [`Frame`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
}

impl Column {
    /// Creates a new column description.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column type.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

/// Rows rejected by [`Frame::push_row`].
#[derive(Clone, Debug, PartialEq)]
pub enum FrameError {
    /// The row does not carry one value per column.
    Arity {
        table: String,
        expected: usize,
        found: usize,
    },
    /// A value does not match the declared column type.
    Type { table: String, column: String },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arity {
                table,
                expected,
                found,
            } => write!(
                f,
                "row for `{table}` has {found} values but the table has {expected} columns"
            ),
            Self::Type { table, column } => {
                write!(f, "value for `{table}.{column}` does not match the column type")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Full contents of one table held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Creates an empty frame with the given columns.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column descriptions.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns all rows.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when the frame holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row after checking its arity and value types.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), FrameError> {
        if row.len() != self.columns.len() {
            return Err(FrameError::Arity {
                table: self.name.clone(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }

        if let Some(column) = self
            .columns
            .iter()
            .zip(&row)
            .find_map(|(column, value)| (!value.fits(column.column_type)).then_some(column))
        {
            return Err(FrameError::Type {
                table: self.name.clone(),
                column: column.name.clone(),
            });
        }

        self.rows.push(row);
        Ok(())
    }

    /// Appends a row and returns the updated frame.
    pub fn with_row(mut self, row: Vec<Value>) -> Result<Self, FrameError> {
        self.push_row(row)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_types_map_onto_column_types() {
        assert_eq!(ColumnType::from_mysql("INT UNSIGNED"), ColumnType::Integer);
        assert_eq!(ColumnType::from_mysql("decimal"), ColumnType::Double);
        assert_eq!(ColumnType::from_mysql("DATETIME"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_mysql("BOOLEAN"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_mysql("ENUM"), ColumnType::Text);
    }

    #[test]
    fn push_row_rejects_wrong_arity() {
        let mut frame = Frame::new("Popust", vec![Column::new("idPopust", ColumnType::Integer)]);
        let err = frame
            .push_row(vec![Value::Integer(1), Value::Null])
            .unwrap_err();
        assert!(matches!(err, FrameError::Arity { expected: 1, found: 2, .. }));
        assert!(frame.is_empty());
    }

    #[test]
    fn push_row_rejects_mismatched_type_but_accepts_null() {
        let mut frame = Frame::new(
            "Popust",
            vec![
                Column::new("idPopust", ColumnType::Integer),
                Column::new("popustUporabljen", ColumnType::Text),
            ],
        );
        frame
            .push_row(vec![Value::Integer(1), Value::Null])
            .expect("null fits any column");
        let err = frame
            .push_row(vec![Value::Text("2".into()), Value::from("Yes")])
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::Type {
                table: "Popust".into(),
                column: "idPopust".into()
            }
        );
        assert_eq!(frame.len(), 1);
    }
}

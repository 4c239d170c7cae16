//! Loading frames into the embedded DuckDB store.
//!
//! Each frame replaces the table of the same name.  All replacements of one load share a single
//! transaction, so a failure part-way leaves the previously loaded table set untouched.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Datelike;
use duckdb::types::{TimeUnit, ToSqlOutput, Value as DuckValue};
use duckdb::{params_from_iter, Connection, ToSql};
use log::{debug, info};
use thiserror::Error;

use crate::frame::{Frame, Value};

/// Days from 0001-01-01 (day 1) to 1970-01-01.
const DAYS_CE_TO_UNIX_EPOCH: i32 = 719_163;

/// Errors raised while writing to the embedded store.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to prepare store location {path}: {source}")]
    Io {
        path: String,
        source: io::Error,
    },
    #[error("table `{table}` has no columns and cannot be created")]
    NoColumns { table: String },
    #[error("embedded store error: {0}")]
    Store(#[from] duckdb::Error),
}

/// Opens (or creates) the store file, creating its parent directory when needed.
pub fn open_store(path: impl AsRef<Path>) -> Result<Connection, LoadError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    info!("Opening DuckDB store at {}", path.display());
    Ok(Connection::open(path)?)
}

/// Quotes an identifier for DuckDB.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Replaces every frame's table inside one transaction.
pub fn load_frames(connection: &mut Connection, frames: &[Frame]) -> Result<(), LoadError> {
    let transaction = connection.transaction()?;
    for frame in frames {
        replace_table(&transaction, frame)?;
    }
    transaction.commit()?;
    info!("Loaded {} tables into the store", frames.len());
    Ok(())
}

/// Drops `frame`'s table if it exists and recreates it from the frame's contents.
pub fn replace_table(connection: &Connection, frame: &Frame) -> Result<(), LoadError> {
    if frame.columns().is_empty() {
        return Err(LoadError::NoColumns {
            table: frame.name().to_string(),
        });
    }

    let table = quote_identifier(frame.name());
    let column_defs = frame
        .columns()
        .iter()
        .map(|column| {
            format!(
                "{} {}",
                quote_identifier(column.name()),
                column.column_type().duckdb_type()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    debug!("Creating table {} ({})", table, column_defs);
    connection.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({column_defs});"
    ))?;

    let placeholders = vec!["?"; frame.columns().len()].join(", ");
    let mut insert = connection.prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))?;
    for row in frame.rows() {
        insert.execute(params_from_iter(row.iter()))?;
    }

    info!("Replaced table `{}` with {} rows", frame.name(), frame.len());
    Ok(())
}

/// Counts the rows of a table or view.
pub fn table_row_count(connection: &Connection, table: &str) -> Result<u64, LoadError> {
    let count: i64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => DuckValue::Null,
            Value::Boolean(value) => DuckValue::Boolean(*value),
            Value::Integer(value) => DuckValue::BigInt(*value),
            Value::Double(value) => DuckValue::Double(*value),
            Value::Text(value) => DuckValue::Text(value.clone()),
            Value::Date(value) => DuckValue::Date32(value.num_days_from_ce() - DAYS_CE_TO_UNIX_EPOCH),
            Value::Timestamp(value) => DuckValue::Timestamp(
                TimeUnit::Microsecond,
                value.and_utc().timestamp_micros(),
            ),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, ColumnType};
    use chrono::NaiveDate;

    fn cas(rows: usize) -> Frame {
        let mut frame = Frame::new(
            "Cas",
            vec![
                Column::new("idDatum", ColumnType::Integer),
                Column::new("PolniDatum", ColumnType::Date),
            ],
        );
        for index in 0..rows {
            let date = NaiveDate::from_ymd_opt(2024, 1, 1 + index as u32);
            frame
                .push_row(vec![Value::Integer(index as i64), Value::from(date)])
                .expect("valid row");
        }
        frame
    }

    #[test]
    fn dates_round_trip_through_the_store() {
        let mut connection = Connection::open_in_memory().expect("in-memory store");
        load_frames(&mut connection, &[cas(1)]).expect("load succeeds");

        let date: String = connection
            .query_row(
                "SELECT CAST(PolniDatum AS VARCHAR) FROM Cas WHERE idDatum = 0",
                [],
                |row| row.get(0),
            )
            .expect("row exists");
        assert_eq!(date, "2024-01-01");
    }

    #[test]
    fn reload_replaces_rather_than_appends() {
        let mut connection = Connection::open_in_memory().expect("in-memory store");
        load_frames(&mut connection, &[cas(3)]).expect("first load");
        load_frames(&mut connection, &[cas(3)]).expect("second load");
        assert_eq!(table_row_count(&connection, "Cas").expect("count"), 3);
    }

    #[test]
    fn empty_frame_without_columns_is_rejected() {
        let mut connection = Connection::open_in_memory().expect("in-memory store");
        let err = load_frames(&mut connection, &[Frame::new("Prazno", Vec::new())]).unwrap_err();
        assert!(matches!(err, LoadError::NoColumns { table } if table == "Prazno"));
    }

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}

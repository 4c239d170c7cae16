//! Full-table extraction from the operational database.
//!
//! Every configured table is read in full, in order, into a [`Frame`].  There is no filtering,
//! pagination or retry: an unreachable server or a missing table aborts the run.

use std::collections::BTreeMap;
use std::io;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column as _, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo};
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::config::SourceConfig;
use crate::frame::{Column, ColumnType, Frame, FrameError, Value};

/// Errors raised while reading tables from a source.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to start the database runtime: {0}")]
    Runtime(#[from] io::Error),
    #[error("failed to connect to MySQL at {address}: {source}")]
    Connect {
        address: String,
        source: sqlx::Error,
    },
    #[error("`{table}` is not a plain table name")]
    InvalidTableName { table: String },
    #[error("table `{table}` does not exist in the source")]
    MissingTable { table: String },
    #[error("failed to read table `{table}`: {source}")]
    Query { table: String, source: sqlx::Error },
    #[error("cannot decode value '{value}' of `{table}.{column}`")]
    Decode {
        table: String,
        column: String,
        value: String,
    },
    #[error("failed to close the MySQL connection: {0}")]
    Close(sqlx::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A database that can hand out complete tables.
pub trait TableSource {
    /// Reads every row of `table`.
    fn read_table(&mut self, table: &str) -> Result<Frame, ExtractError>;
}

/// Reads `tables` in order from `source`.
pub fn extract_tables<S, I>(source: &mut S, tables: I) -> Result<Vec<Frame>, ExtractError>
where
    S: TableSource + ?Sized,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut frames = Vec::new();
    for table in tables {
        let table = table.as_ref();
        let frame = source.read_table(table)?;
        info!("Read {} rows from `{}`", frame.len(), table);
        frames.push(frame);
    }
    Ok(frames)
}

/// Returns whether `name` can be interpolated into SQL as a bare identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Frames kept in memory and served as if they were source tables.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    frames: BTreeMap<String, Frame>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a frame under its own name, replacing any frame with the same name.
    pub fn insert(&mut self, frame: Frame) {
        self.frames.insert(frame.name().to_string(), frame);
    }

    /// Adds a frame and returns the updated source.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.insert(frame);
        self
    }
}

impl FromIterator<Frame> for MemorySource {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        let mut source = Self::new();
        for frame in iter {
            source.insert(frame);
        }
        source
    }
}

impl TableSource for MemorySource {
    fn read_table(&mut self, table: &str) -> Result<Frame, ExtractError> {
        self.frames
            .get(table)
            .cloned()
            .ok_or_else(|| ExtractError::MissingTable {
                table: table.to_string(),
            })
    }
}

/// Blocking MySQL source.
///
/// The driver is async, so the source owns a current-thread runtime and blocks on every call.
/// Nothing is spawned; reads happen one after another on the caller's thread.
pub struct MySqlSource {
    runtime: Runtime,
    connection: MySqlConnection,
}

impl MySqlSource {
    /// Connects to the configured server.
    pub fn connect(config: &SourceConfig) -> Result<Self, ExtractError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        info!(
            "Connecting to MySQL at {}:{}/{}",
            config.host, config.port, config.database
        );
        let connection =
            runtime
                .block_on(options.connect())
                .map_err(|source| ExtractError::Connect {
                    address: format!("{}:{}/{}", config.host, config.port, config.database),
                    source,
                })?;

        Ok(Self {
            runtime,
            connection,
        })
    }

    /// Closes the connection gracefully.
    pub fn close(self) -> Result<(), ExtractError> {
        let Self {
            runtime,
            connection,
        } = self;
        runtime
            .block_on(connection.close())
            .map_err(ExtractError::Close)
    }
}

impl TableSource for MySqlSource {
    fn read_table(&mut self, table: &str) -> Result<Frame, ExtractError> {
        if !is_plain_identifier(table) {
            return Err(ExtractError::InvalidTableName {
                table: table.to_string(),
            });
        }

        let sql = format!("SELECT * FROM `{table}`");
        let query_error = |source: sqlx::Error| ExtractError::Query {
            table: table.to_string(),
            source,
        };
        let connection = &mut self.connection;

        // Column metadata comes from the prepared statement so empty tables keep their shape;
        // rows come over the text protocol and are parsed per column type.
        let (columns, rows) = self.runtime.block_on(async {
            let statement = (&mut *connection).prepare(&sql).await.map_err(query_error)?;
            let columns: Vec<(Column, String)> = statement
                .columns()
                .iter()
                .map(|column| {
                    let type_name = column.type_info().name().to_string();
                    (
                        Column::new(column.name(), ColumnType::from_mysql(&type_name)),
                        type_name,
                    )
                })
                .collect();
            let rows = sqlx::raw_sql(&sql)
                .fetch_all(&mut *connection)
                .await
                .map_err(query_error)?;
            Ok::<_, ExtractError>((columns, rows))
        })?;

        for (column, type_name) in &columns {
            debug!(
                "`{}`.`{}`: {} -> {:?}",
                table,
                column.name(),
                type_name,
                column.column_type()
            );
        }

        let mut frame = Frame::new(
            table,
            columns.iter().map(|(column, _)| column.clone()).collect(),
        );
        for row in &rows {
            let values = columns
                .iter()
                .enumerate()
                .map(|(index, (column, _))| decode_text_value(table, column, row, index))
                .collect::<Result<Vec<_>, _>>()?;
            frame.push_row(values)?;
        }

        Ok(frame)
    }
}

fn decode_text_value(
    table: &str,
    column: &Column,
    row: &MySqlRow,
    index: usize,
) -> Result<Value, ExtractError> {
    let raw = match row.try_get_unchecked::<Option<String>, _>(index) {
        Ok(raw) => raw,
        Err(_) => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(index)
            .map_err(|source| ExtractError::Query {
                table: table.to_string(),
                source,
            })?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
    };

    let Some(raw) = raw else {
        return Ok(Value::Null);
    };

    parse_text_value(column.column_type(), &raw).ok_or_else(|| ExtractError::Decode {
        table: table.to_string(),
        column: column.name().to_string(),
        value: raw,
    })
}

/// Parses a value delivered in MySQL's text protocol.
///
/// Zero dates (`0000-00-00`) become nulls. Integers outside the `i64` range are rejected.
pub fn parse_text_value(column_type: ColumnType, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    match column_type {
        ColumnType::Text => Some(Value::Text(raw.to_string())),
        ColumnType::Boolean if trimmed.eq_ignore_ascii_case("true") => Some(Value::Boolean(true)),
        ColumnType::Boolean if trimmed.eq_ignore_ascii_case("false") => {
            Some(Value::Boolean(false))
        }
        // TINYINT(1) is reported as BOOLEAN but holds any byte value.
        ColumnType::Boolean => trimmed.parse::<i64>().ok().map(|n| Value::Boolean(n != 0)),
        ColumnType::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        ColumnType::Double => trimmed.parse::<f64>().ok().map(Value::Double),
        ColumnType::Date => {
            if trimmed.starts_with("0000-00-00") {
                return Some(Value::Null);
            }
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(Value::Date)
        }
        ColumnType::Timestamp => {
            if trimmed.starts_with("0000-00-00") {
                return Some(Value::Null);
            }
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(Value::Timestamp)
        }
    }
}

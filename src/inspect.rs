//! Console view of the embedded store: its tables and the first rows of the reporting view.

use std::fmt;

use duckdb::Connection;
use log::debug;

use crate::load::{quote_identifier, LoadError};

/// Number of view rows shown when no limit is given.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

const NULL_CELL: &str = "NULL";

/// Tables of the store and a sample of one view, with every cell rendered as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreSummary {
    pub tables: Vec<String>,
    pub view: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Lists the store's tables and views and reads the first `limit` rows of `view`.
pub fn inspect_store(
    connection: &Connection,
    view: &str,
    limit: usize,
) -> Result<StoreSummary, LoadError> {
    let tables = {
        let mut statement = connection.prepare("SHOW TABLES")?;
        let names = statement.query_map([], |row| row.get::<_, String>(0))?;
        names.collect::<Result<Vec<_>, _>>()?
    };

    let columns = {
        let mut statement = connection.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = statement.query_map([view], |row| row.get::<_, String>(0))?;
        names.collect::<Result<Vec<_>, _>>()?
    };

    let rows = if columns.is_empty() {
        Vec::new()
    } else {
        let select = columns
            .iter()
            .map(|column| format!("CAST({} AS VARCHAR)", quote_identifier(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select} FROM {} LIMIT {limit}",
            quote_identifier(view)
        );
        debug!("Sampling view: {sql}");

        let mut statement = connection.prepare(&sql)?;
        let width = columns.len();
        let rows = statement.query_map([], |row| {
            (0..width)
                .map(|index| row.get::<_, Option<String>>(index))
                .collect::<duckdb::Result<Vec<_>>>()
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    Ok(StoreSummary {
        tables,
        view: view.to_string(),
        columns,
        rows,
    })
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tables in store:")?;
        for table in &self.tables {
            writeln!(f, "  {table}")?;
        }

        writeln!(f)?;
        if self.columns.is_empty() {
            return writeln!(f, "View `{}` not found.", self.view);
        }
        writeln!(f, "First {} rows of `{}`:", self.rows.len(), self.view)?;
        writeln!(f, "{}", self.columns.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<&str> = row
                .iter()
                .map(|cell| cell.as_deref().unwrap_or(NULL_CELL))
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

//! Database drivers.
//!
//! A [`Driver`] is the thin per-engine shim below [`Connection`]: it runs
//! rendered statements through sqlx and turns result rows into [`Row`]s.
//! The API is blocking; each driver owns a single-threaded tokio runtime.

pub mod connection;
pub mod cursor;
pub mod mysql;
pub mod postgres;
pub mod row;

pub use connection::Connection;
pub use cursor::RowCursor;
pub use mysql::MysqlDriver;
pub use postgres::PostgresDriver;
pub use row::Row;

use crate::error::RelmapResult;
use crate::transpiler::{Dialect, Statement};

/// How much of a result set to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchType {
    /// Execute only
    #[default]
    None,
    One,
    All,
    Iterative,
}

/// Result of executing one statement.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Done { affected: u64 },
    Row(Option<Row>),
    Rows(Vec<Row>),
    Cursor(RowCursor),
}

impl QueryOutput {
    pub fn affected(&self) -> u64 {
        match self {
            QueryOutput::Done { affected } => *affected,
            QueryOutput::Row(row) => u64::from(row.is_some()),
            QueryOutput::Rows(rows) => rows.len() as u64,
            QueryOutput::Cursor(cursor) => cursor.len() as u64,
        }
    }

    /// First row, whatever the fetch type was.
    pub fn into_row(self) -> Option<Row> {
        match self {
            QueryOutput::Done { .. } => None,
            QueryOutput::Row(row) => row,
            QueryOutput::Rows(rows) => rows.into_iter().next(),
            QueryOutput::Cursor(mut cursor) => cursor.next(),
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            QueryOutput::Done { .. } => Vec::new(),
            QueryOutput::Row(row) => row.into_iter().collect(),
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Cursor(cursor) => cursor.collect(),
        }
    }
}

/// Engine-specific execution.
pub trait Driver: Send {
    fn dialect(&self) -> Dialect;

    fn connect(&mut self) -> RelmapResult<()>;

    fn disconnect(&mut self) -> RelmapResult<()>;

    fn is_connected(&self) -> bool;

    /// Run the statement's setup list, then the statement itself.
    ///
    /// When `statement.returning` is set the generated key is captured and
    /// reported by [`Driver::last_insert_id`].
    fn execute(&mut self, statement: &Statement, fetch: FetchType) -> RelmapResult<QueryOutput>;

    /// Key generated by the most recent insert.
    fn last_insert_id(&self) -> Option<i64>;

    /// Human-readable server description.
    fn status(&mut self) -> RelmapResult<String>;
}

/// Builds the runtime a blocking driver drives its connection on.
pub(crate) fn blocking_runtime() -> RelmapResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

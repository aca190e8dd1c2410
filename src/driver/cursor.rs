use std::collections::VecDeque;

use super::Row;
use crate::error::{RelmapError, RelmapResult};

/// Iterative result set.
///
/// MySQL results are forward-only; rewinding needs the row cache. PostgreSQL
/// results are addressable by index and can always be rewound.
#[derive(Debug, Clone)]
pub struct RowCursor {
    pending: VecDeque<Row>,
    fetched: Vec<Row>,
    position: usize,
    num_rows: usize,
    mode: CursorMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorMode {
    Forward { cache: bool },
    Indexed,
}

impl RowCursor {
    /// Forward-only cursor, optionally caching fetched rows for rewinds.
    pub fn forward(rows: Vec<Row>, cache: bool) -> Self {
        Self {
            num_rows: rows.len(),
            pending: rows.into(),
            fetched: Vec::new(),
            position: 0,
            mode: CursorMode::Forward { cache },
        }
    }

    /// Random-access cursor.
    pub fn indexed(rows: Vec<Row>) -> Self {
        Self {
            num_rows: rows.len(),
            pending: VecDeque::new(),
            fetched: rows,
            position: 0,
            mode: CursorMode::Indexed,
        }
    }

    pub fn len(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Row at `index`. Only available on indexed cursors or for cached rows.
    pub fn get(&self, index: usize) -> Option<&Row> {
        match self.mode {
            CursorMode::Indexed | CursorMode::Forward { cache: true } => self.fetched.get(index),
            CursorMode::Forward { cache: false } => None,
        }
    }

    pub fn rewind(&mut self) -> RelmapResult<()> {
        match self.mode {
            CursorMode::Indexed | CursorMode::Forward { cache: true } => {
                self.position = 0;
                Ok(())
            }
            CursorMode::Forward { cache: false } if self.position == 0 => Ok(()),
            CursorMode::Forward { cache: false } => Err(RelmapError::execution(
                "RowCursor::rewind() not supported, when caching is disabled",
            )),
        }
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.position >= self.num_rows {
            return None;
        }
        let row = match self.mode {
            CursorMode::Indexed => self.fetched.get(self.position).cloned(),
            CursorMode::Forward { cache: true } => {
                if self.position >= self.fetched.len() {
                    let row = self.pending.pop_front()?;
                    self.fetched.push(row);
                }
                self.fetched.get(self.position).cloned()
            }
            CursorMode::Forward { cache: false } => self.pending.pop_front(),
        };
        self.position += 1;
        row
    }
}

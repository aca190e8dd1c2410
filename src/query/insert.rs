use crate::ast::{Expr, Value};

/// Conflict handling for INSERT.
///
/// MySQL renders `ON DUPLICATE KEY UPDATE`, PostgreSQL renders
/// `ON CONFLICT (cols) DO UPDATE SET` and needs the conflicting columns.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStrategy {
    pub conflicting_columns: Vec<String>,
    pub values: Vec<(String, Expr)>,
}

impl UpdateStrategy {
    pub fn new<S: Into<String>>(conflicting_columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            conflicting_columns: conflicting_columns.into_iter().map(Into::into).collect(),
            values: Vec::new(),
        }
    }

    /// `column = value` on conflict.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.values.push((column.to_string(), Expr::Value(value.into())));
        self
    }

    /// `column = <incoming value of source>` on conflict.
    pub fn set_from(mut self, column: &str, source: &str) -> Self {
        self.values
            .push((column.to_string(), Expr::Column(source.to_string())));
        self
    }
}

/// INSERT query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
    pub on_duplicate: Option<UpdateStrategy>,
    pub returning: Option<String>,
}

impl Insert {
    pub fn new<S: Into<String>>(table: &str, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            on_duplicate: None,
            returning: None,
        }
    }

    /// Append a row of bound values.
    pub fn add_row<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.rows
            .push(values.into_iter().map(|v| Expr::Value(v.into())).collect());
        self
    }

    /// Append a row of arbitrary expressions.
    pub fn add_row_exprs(mut self, values: impl IntoIterator<Item = Expr>) -> Self {
        self.rows.push(values.into_iter().collect());
        self
    }

    pub fn on_duplicate_key(mut self, strategy: UpdateStrategy) -> Self {
        self.on_duplicate = Some(strategy);
        self
    }

    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }
}

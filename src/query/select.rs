use crate::ast::{Condition, Expr, JoinKind, SortOrder, col};

/// A JOIN clause: ` INNER JOIN table alias ON (cond)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub on: Vec<Condition>,
}

impl Join {
    /// Join `table` on `left_column = right_column`.
    pub fn new(kind: JoinKind, table: &str, left_column: &str, right_column: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            alias: None,
            on: vec![Condition::columns_eq(left_column, right_column)],
        }
    }

    pub fn inner(table: &str, left_column: &str, right_column: &str) -> Self {
        Self::new(JoinKind::Inner, table, left_column, right_column)
    }

    pub fn left(table: &str, left_column: &str, right_column: &str) -> Self {
        Self::new(JoinKind::Left, table, left_column, right_column)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn and_on(mut self, condition: Condition) -> Self {
        self.on.push(condition);
        self
    }
}

/// SELECT query builder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub values: Vec<Expr>,
    pub tables: Vec<String>,
    pub joins: Vec<Join>,
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
    pub having: Vec<Condition>,
    pub order_by: Vec<String>,
    pub sort: SortOrder,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub for_update: bool,
}

impl Select {
    /// Select the given column names.
    pub fn new<S: AsRef<str>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            values: columns.into_iter().map(|c| col(c.as_ref())).collect(),
            ..Default::default()
        }
    }

    /// Select arbitrary expressions.
    pub fn exprs(values: impl IntoIterator<Item = Expr>) -> Self {
        Self {
            values: values.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Replace the select list with column names.
    pub fn select<S: AsRef<str>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.values = columns.into_iter().map(|c| col(c.as_ref())).collect();
        self
    }

    pub fn add_value(mut self, value: Expr) -> Self {
        self.values.push(value);
        self
    }

    pub fn add_column(self, column: &str) -> Self {
        self.add_value(col(column))
    }

    pub fn from(mut self, table: &str) -> Self {
        self.tables.push(table.to_string());
        self
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<crate::ast::Value>) -> Self {
        self.where_(Condition::eq(column, value))
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.having.push(condition);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(self, table: &str, left: &str, right: &str, alias: Option<&str>) -> Self {
        let mut join = Join::inner(table, left, right);
        join.alias = alias.map(str::to_string);
        self.join(join)
    }

    pub fn left_join(self, table: &str, left: &str, right: &str, alias: Option<&str>) -> Self {
        let mut join = Join::left(table, left, right);
        join.alias = alias.map(str::to_string);
        self.join(join)
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(column.to_string());
        self
    }

    pub fn ascending(mut self) -> Self {
        self.sort = SortOrder::Asc;
        self
    }

    pub fn descending(mut self) -> Self {
        self.sort = SortOrder::Desc;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn lock_for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    /// Restrict to the first row.
    pub fn first(self) -> Self {
        self.limit(1)
    }
}

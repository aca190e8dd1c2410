use crate::ast::{Condition, Expr, Value};

/// UPDATE query builder. Assignments keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub values: Vec<(String, Expr)>,
    pub conditions: Vec<Condition>,
}

impl Update {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Assign a value. Setting the same column twice replaces the earlier value.
    pub fn set(self, column: &str, value: impl Into<Value>) -> Self {
        self.set_expr(column, Expr::Value(value.into()))
    }

    pub fn set_expr(mut self, column: &str, value: Expr) -> Self {
        match self.values.iter_mut().find(|(c, _)| c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column.to_string(), value)),
        }
        self
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(Condition::eq(column, value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

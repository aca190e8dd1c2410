use crate::ast::{Condition, Value};

/// DELETE query builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub conditions: Vec<Condition>,
}

impl Delete {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Vec::new(),
        }
    }

    pub fn where_(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_(Condition::eq(column, value))
    }
}

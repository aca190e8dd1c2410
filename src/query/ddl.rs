//! Schema statements: CREATE TABLE, ALTER TABLE, DROP and TRUNCATE.

use crate::ast::Value;
use crate::schema::{Column, Constraint, OnDelete};

/// CREATE TABLE builder. Columns are unique by name; re-adding one replaces it
/// in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub table: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    pub if_not_exists: bool,
}

impl CreateTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            constraints: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn add_column(mut self, column: Column) -> Self {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    pub fn add_serial(self, name: &str) -> Self {
        self.add_column(Column::serial(name))
    }

    pub fn add_string(self, name: &str, max_size: Option<u32>) -> Self {
        match max_size {
            Some(n) => self.add_column(Column::string(name, n)),
            None => self.add_column(Column::text(name)),
        }
    }

    pub fn add_int(self, name: &str) -> Self {
        self.add_column(Column::int(name))
    }

    pub fn add_int_default(self, name: &str, default: impl Into<Value>) -> Self {
        self.add_column(Column::int(name).default(default))
    }

    pub fn add_bool(self, name: &str, default: bool) -> Self {
        self.add_column(Column::bool(name, default))
    }

    pub fn add_datetime(self, name: &str) -> Self {
        self.add_column(Column::datetime(name))
    }

    pub fn add_datetime_now(self, name: &str) -> Self {
        self.add_column(Column::datetime(name).default_now())
    }

    pub fn add_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn primary_key<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        let pk = Constraint::primary_key(columns);
        let name = pk.generated_name(&self.table);
        let pk = match name {
            Some(name) => pk.named(name),
            None => pk,
        };
        self.add_constraint(pk)
    }

    pub fn unique<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.add_constraint(Constraint::unique(columns))
    }

    pub fn foreign_key(
        self,
        column: &str,
        ref_table: &str,
        ref_column: &str,
        on_delete: Option<OnDelete>,
    ) -> Self {
        let fk = Constraint::foreign_key(column, ref_table, ref_column, on_delete);
        let fk = match fk.generated_name(&self.table) {
            Some(name) => fk.named(name),
            None => fk,
        };
        self.add_constraint(fk)
    }

    pub fn only_if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Tables referenced by foreign keys, excluding self references.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = Vec::new();
        for constraint in &self.constraints {
            if let crate::schema::ConstraintKind::ForeignKey { ref_table, .. } = &constraint.kind
                && ref_table != &self.table
                && !deps.contains(&ref_table.as_str())
            {
                deps.push(ref_table.as_str());
            }
        }
        deps
    }
}

/// What a single ALTER TABLE statement does.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(Column),
    ModifyColumn(Column),
    DropColumn(String),
    AddConstraint(Constraint),
    ModifyConstraint(Constraint),
    DropConstraint(Constraint),
    /// Append a value to an enum column's value set
    AddEnumValue { column: Column, value: String },
    ResetAutoIncrement,
}

/// ALTER TABLE builder holding exactly one action.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub table: String,
    pub action: Option<AlterAction>,
}

impl AlterTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            action: None,
        }
    }

    fn with(mut self, action: AlterAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn add_column(self, column: Column) -> Self {
        self.with(AlterAction::AddColumn(column))
    }

    pub fn modify_column(self, column: Column) -> Self {
        self.with(AlterAction::ModifyColumn(column))
    }

    pub fn drop_column(self, name: &str) -> Self {
        self.with(AlterAction::DropColumn(name.to_string()))
    }

    pub fn add_constraint(self, constraint: Constraint) -> Self {
        self.with(AlterAction::AddConstraint(constraint))
    }

    pub fn modify_constraint(self, constraint: Constraint) -> Self {
        self.with(AlterAction::ModifyConstraint(constraint))
    }

    pub fn drop_constraint(self, constraint: Constraint) -> Self {
        self.with(AlterAction::DropConstraint(constraint))
    }

    pub fn add_to_enum(self, column: Column, value: &str) -> Self {
        self.with(AlterAction::AddEnumValue {
            column,
            value: value.to_string(),
        })
    }

    pub fn reset_auto_increment(self) -> Self {
        self.with(AlterAction::ResetAutoIncrement)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drop {
    pub table: String,
}

impl Drop {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Truncate {
    pub table: String,
}

impl Truncate {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }
}

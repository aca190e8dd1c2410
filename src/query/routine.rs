//! Stored procedures and the triggers that call them.

use super::Query;
use crate::ast::{Expr, Value};
use crate::schema::Column;

/// A procedure parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureParam {
    /// Name of the table the calling trigger fired on
    CurrentTable,
    /// Column of the row the calling trigger fired on
    Row(Column),
    /// Constant passed by the calling trigger
    Argument(Column),
}

impl ProcedureParam {
    pub fn name(&self) -> &str {
        match self {
            ProcedureParam::CurrentTable => "CURRENT_TABLE",
            ProcedureParam::Row(c) | ProcedureParam::Argument(c) => &c.name,
        }
    }

    pub fn column(&self) -> Column {
        match self {
            ProcedureParam::CurrentTable => Column::text("CURRENT_TABLE"),
            ProcedureParam::Row(c) | ProcedureParam::Argument(c) => c.clone(),
        }
    }
}

/// CREATE PROCEDURE builder. Procedures returning a trigger are rendered as
/// trigger functions on PostgreSQL.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateProcedure {
    pub name: String,
    pub params: Vec<ProcedureParam>,
    pub statements: Vec<Query>,
    pub returns_trigger: bool,
}

impl CreateProcedure {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            statements: Vec::new(),
            returns_trigger: false,
        }
    }

    pub fn param(mut self, param: ProcedureParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns_trigger(mut self) -> Self {
        self.returns_trigger = true;
        self
    }

    pub fn exec(mut self, statements: impl IntoIterator<Item = Query>) -> Self {
        self.statements = statements.into_iter().collect();
        self
    }

    /// Index of a constant argument among the trigger arguments.
    pub fn argument_index(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .filter(|p| matches!(p, ProcedureParam::Argument(_)))
            .position(|p| p.name() == name)
    }

    pub fn find_param(&self, name: &str) -> Option<&ProcedureParam> {
        self.params.iter().find(|p| p.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTime {
    Before,
    After,
}

impl TriggerTime {
    pub fn keyword(&self) -> &'static str {
        match self {
            TriggerTime::Before => "BEFORE",
            TriggerTime::After => "AFTER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    pub fn keyword(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
        }
    }

    /// Row alias holding the affected row inside a trigger.
    pub fn row_alias(&self) -> &'static str {
        match self {
            TriggerEvent::Delete => "OLD",
            _ => "NEW",
        }
    }
}

/// CREATE TRIGGER builder.
///
/// Arguments are [`Expr::CurrentTable`], [`Expr::CurrentColumn`] or
/// constant values, matching the called procedure's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTrigger {
    pub name: String,
    pub time: TriggerTime,
    pub event: TriggerEvent,
    pub table: String,
    pub procedure: Option<CreateProcedure>,
    pub arguments: Vec<Expr>,
    pub if_not_exists: bool,
}

impl CreateTrigger {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            time: TriggerTime::After,
            event: TriggerEvent::Insert,
            table: String::new(),
            procedure: None,
            arguments: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn before(mut self) -> Self {
        self.time = TriggerTime::Before;
        self
    }

    pub fn after(mut self) -> Self {
        self.time = TriggerTime::After;
        self
    }

    pub fn on(mut self, event: TriggerEvent, table: &str) -> Self {
        self.event = event;
        self.table = table.to_string();
        self
    }

    pub fn insert(self, table: &str) -> Self {
        self.on(TriggerEvent::Insert, table)
    }

    pub fn update(self, table: &str) -> Self {
        self.on(TriggerEvent::Update, table)
    }

    pub fn delete(self, table: &str) -> Self {
        self.on(TriggerEvent::Delete, table)
    }

    pub fn only_if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn exec(mut self, procedure: CreateProcedure, arguments: impl IntoIterator<Item = Expr>) -> Self {
        self.procedure = Some(procedure);
        self.arguments = arguments.into_iter().collect();
        self
    }

    /// Shorthand for a constant argument.
    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Value(value.into())
    }
}

//! Query builders. Each builder only collects data; rendering happens in
//! [`crate::transpiler`] against a dialect.

pub mod ddl;
pub mod delete;
pub mod insert;
pub mod routine;
pub mod select;
pub mod update;

pub use ddl::{AlterAction, AlterTable, CreateTable, Drop, Truncate};
pub use delete::Delete;
pub use insert::{Insert, UpdateStrategy};
pub use routine::{CreateProcedure, CreateTrigger, ProcedureParam, TriggerEvent, TriggerTime};
pub use select::{Join, Select};
pub use update::Update;

/// Any statement the driver layer can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    CreateTable(CreateTable),
    AlterTable(AlterTable),
    Drop(Drop),
    Truncate(Truncate),
    CreateProcedure(CreateProcedure),
    CreateTrigger(CreateTrigger),
    StartTransaction,
    Commit,
    Rollback,
}

impl Query {
    /// Short statement kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Select(_) => "SELECT",
            Query::Insert(_) => "INSERT",
            Query::Update(_) => "UPDATE",
            Query::Delete(_) => "DELETE",
            Query::CreateTable(_) => "CREATE TABLE",
            Query::AlterTable(_) => "ALTER TABLE",
            Query::Drop(_) => "DROP",
            Query::Truncate(_) => "TRUNCATE",
            Query::CreateProcedure(_) => "CREATE PROCEDURE",
            Query::CreateTrigger(_) => "CREATE TRIGGER",
            Query::StartTransaction => "START TRANSACTION",
            Query::Commit => "COMMIT",
            Query::Rollback => "ROLLBACK",
        }
    }

    /// Column whose generated value should be reported back after an insert.
    pub fn returning(&self) -> Option<&str> {
        match self {
            Query::Insert(insert) => insert.returning.as_deref(),
            _ => None,
        }
    }

    /// Target table of CREATE TABLE, if this is one.
    pub fn created_table(&self) -> Option<&CreateTable> {
        match self {
            Query::CreateTable(t) => Some(t),
            _ => None,
        }
    }
}

macro_rules! impl_from_query {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Query {
                fn from(q: $ty) -> Self {
                    Query::$ty(q)
                }
            }
        )*
    };
}

impl_from_query!(
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    AlterTable,
    Drop,
    Truncate,
    CreateProcedure,
    CreateTrigger
);

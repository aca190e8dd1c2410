//! Column and constraint descriptors shared by DDL queries and entity handlers.

pub mod column;
pub mod constraint;

pub use column::{Column, ColumnDefault, ColumnKind};
pub use constraint::{Constraint, ConstraintKind, OnDelete};

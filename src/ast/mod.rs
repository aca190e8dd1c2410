//! Driver-neutral value, expression and condition nodes.

pub mod conditions;
pub mod expr;
pub mod operators;
pub mod values;

pub use conditions::{Condition, InList};
pub use expr::{Expr, col, val};
pub use operators::{IntervalUnit, JoinKind, Operator, SortOrder};
pub use values::Value;

//! Transpiler tests organized by category.

mod conditions;
mod ddl;

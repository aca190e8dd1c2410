//! Per-dialect generators.

pub mod mysql;
pub mod postgres;

use super::{Dialect, ParamContext};
use crate::ast::{IntervalUnit, Value};
use crate::error::RelmapResult;
use crate::query::{AlterTable, CreateProcedure, CreateTrigger, UpdateStrategy};
use crate::schema::{Column, ColumnDefault, Constraint, ConstraintKind};

/// Dialect-specific pieces of SQL generation.
///
/// Everything that reads the same on both servers lives in the provided
/// methods; generators only fill in the differences.
pub trait SqlGenerator {
    fn dialect(&self) -> Dialect;

    /// Quote a single identifier part.
    fn quote_identifier(&self, name: &str) -> String;

    /// Render a `col as alias` alias.
    fn quote_alias(&self, alias: &str) -> String;

    /// Placeholder for the `index`-th (1-based) bound parameter.
    fn placeholder(&self, index: usize) -> String;

    /// Quote and escape a string literal.
    fn string_literal(&self, value: &str) -> String;

    /// SQL type of a column, without constraints.
    fn column_type(&self, column: &Column) -> RelmapResult<String>;

    /// Full column definition. May register setup statements on `ctx`.
    fn column_definition(&self, column: &Column, ctx: &mut ParamContext) -> RelmapResult<String>;

    /// Conflict clause appended to an INSERT, including its leading space.
    fn on_duplicate(&self, strategy: &UpdateStrategy, ctx: &mut ParamContext) -> RelmapResult<String>;

    /// RETURNING clause appended to an INSERT, including its leading space.
    fn returning(&self, _column: &str) -> String {
        String::new()
    }

    fn date_add(&self, lhs: &str, amount: i64, unit: IntervalUnit) -> String;

    fn date_sub(&self, lhs: &str, amount: i64, unit: IntervalUnit) -> String;

    /// `lhs ~ rhs` style regular expression match.
    fn regex_match(&self, lhs: &str, rhs: &str) -> String;

    /// Reference to the table a trigger fired on, inside a procedure body.
    fn current_table(&self) -> String;

    /// Reference to a procedure parameter or trigger row column.
    fn current_column(&self, name: &str, ctx: &ParamContext) -> RelmapResult<String>;

    fn truncate(&self, table: &str) -> String;

    fn start_transaction(&self) -> &'static str;

    /// ALTER TABLE statement appending a value to an enum column.
    fn add_enum_value(
        &self,
        alter: &AlterTable,
        column: &Column,
        value: &str,
        ctx: &mut ParamContext,
    ) -> RelmapResult<String>;

    /// ALTER TABLE clause changing an existing column, without the table prefix.
    fn modify_column(&self, column: &Column, ctx: &mut ParamContext) -> RelmapResult<String>;

    /// ALTER TABLE clause dropping the primary key, without the table prefix.
    fn drop_primary_key(&self, table: &str) -> String;

    fn reset_auto_increment(&self, table: &str) -> String;

    fn create_procedure(&self, procedure: &CreateProcedure) -> RelmapResult<String>;

    /// Everything after `FOR EACH ROW` in a CREATE TRIGGER statement.
    fn trigger_body(&self, trigger: &CreateTrigger, procedure: &CreateProcedure) -> RelmapResult<String>;

    /// Keyword inserted after CREATE when a trigger may already exist.
    fn trigger_if_not_exists(&self) -> (&'static str, &'static str);

    /// Quote a possibly qualified table name. `tbl alias` keeps the alias bare.
    fn table_name(&self, table: &str) -> String {
        let parts: Vec<&str> = table.split(' ').collect();
        if let [name, alias] = parts.as_slice() {
            return format!("{} {}", self.quote_identifier(name), alias);
        }
        table
            .split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote a column reference: `col`, `tbl.col` or `col as alias`.
    fn column_name(&self, column: &str) -> String {
        if column == "*" {
            return column.to_string();
        }
        if let Some(idx) = column.rfind('.') {
            let table = &column[..idx];
            let rest = &column[idx + 1..];
            return format!("{}.{}", self.table_name(table), self.column_name(rest));
        }
        let lower = column.to_lowercase();
        if let Some(idx) = lower.find(" as ") {
            let name = self.column_name(column[..idx].trim());
            let alias = column[idx + 4..].trim();
            return format!("{} as {}", name, self.quote_alias(alias));
        }
        self.quote_identifier(column)
    }

    fn column_names(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.column_name(c))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "TRUE".to_string() } else { "FALSE".to_string() }
    }

    /// Render a value as an SQL literal.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.bool_literal(*b),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => self.string_literal(s),
            Value::Json(j) => self.string_literal(&j.to_string()),
            other => self.string_literal(&other.to_text().unwrap_or_default()),
        }
    }

    fn default_literal(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Value(v) => self.literal(v),
            ColumnDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            ColumnDefault::Keyword(k) => k.clone(),
        }
    }

    /// `name TYPE[ NOT NULL][ DEFAULT v]`. Nullable columns without a default
    /// get `DEFAULT NULL`.
    fn render_column(&self, column: &Column, sql_type: &str, default: Option<&ColumnDefault>) -> String {
        let mut sql = format!("{} {}", self.column_name(&column.name), sql_type);
        if column.not_null() {
            sql.push_str(" NOT NULL");
        }
        match default {
            Some(d) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(&self.default_literal(d));
            }
            None if column.nullable => sql.push_str(" DEFAULT NULL"),
            None => {}
        }
        sql
    }

    fn constraint_definition(&self, constraint: &Constraint) -> String {
        match &constraint.kind {
            ConstraintKind::PrimaryKey(cols) => format!("PRIMARY KEY ({})", self.column_names(cols)),
            ConstraintKind::Unique(cols) => format!("UNIQUE ({})", self.column_names(cols)),
            ConstraintKind::ForeignKey {
                column,
                ref_table,
                ref_column,
                on_delete,
            } => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.column_name(column),
                    self.table_name(ref_table),
                    self.column_name(ref_column)
                );
                if let Some(strategy) = on_delete {
                    sql.push(' ');
                    sql.push_str(strategy.sql());
                }
                sql
            }
        }
    }
}

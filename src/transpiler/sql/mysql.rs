use crate::ast::{Expr, IntervalUnit};
use crate::error::RelmapResult;
use crate::query::{AlterTable, CreateProcedure, CreateTrigger, UpdateStrategy};
use crate::schema::{Column, ColumnKind};
use crate::transpiler::expr::ExprToSql;
use crate::transpiler::routines::procedure_body;
use crate::transpiler::traits::SqlGenerator;
use crate::transpiler::{Dialect, ParamContext};

/// MySQL Generator.
pub struct MysqlGenerator;

impl SqlGenerator for MysqlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::MySQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_alias(&self, alias: &str) -> String {
        alias.to_string()
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn string_literal(&self, value: &str) -> String {
        let mut escaped = String::with_capacity(value.len() + 2);
        escaped.push('\'');
        for c in value.chars() {
            match c {
                '\'' | '"' | '\\' => {
                    escaped.push('\\');
                    escaped.push(c);
                }
                '\0' => escaped.push_str("\\0"),
                c => escaped.push(c),
            }
        }
        escaped.push('\'');
        escaped
    }

    fn column_type(&self, column: &Column) -> RelmapResult<String> {
        Ok(match &column.kind {
            ColumnKind::String { max_size: Some(n) } if *n > 0 => format!("VARCHAR({})", n),
            ColumnKind::String { .. } => "TEXT".to_string(),
            ColumnKind::Serial => "INTEGER AUTO_INCREMENT".to_string(),
            ColumnKind::Int { big, unsigned } => {
                let base = if *big { "BIGINT" } else { "INTEGER" };
                if *unsigned {
                    format!("{} UNSIGNED", base)
                } else {
                    base.to_string()
                }
            }
            ColumnKind::DateTime => "DATETIME".to_string(),
            ColumnKind::Bool => "BOOLEAN".to_string(),
            // some MariaDB setups reject the JSON type
            ColumnKind::Json => "LONGTEXT".to_string(),
            ColumnKind::Float => "FLOAT".to_string(),
            ColumnKind::Double => "DOUBLE".to_string(),
            ColumnKind::Numeric {
                digits,
                decimal_digits,
            } => match (digits, decimal_digits) {
                (Some(d), Some(s)) => format!("NUMERIC({},{})", d, s),
                (Some(d), None) => format!("NUMERIC({})", d),
                _ => "NUMERIC".to_string(),
            },
            ColumnKind::Enum { values } => {
                let values = values
                    .iter()
                    .map(|v| self.string_literal(v))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("ENUM({})", values)
            }
        })
    }

    fn column_definition(&self, column: &Column, _ctx: &mut ParamContext) -> RelmapResult<String> {
        let sql_type = self.column_type(column)?;
        // LONGTEXT columns cannot carry a default
        let default = match column.kind {
            ColumnKind::Json => None,
            _ => column.default.as_ref(),
        };
        Ok(self.render_column(column, &sql_type, default))
    }

    fn on_duplicate(&self, strategy: &UpdateStrategy, ctx: &mut ParamContext) -> RelmapResult<String> {
        let mut updates = Vec::with_capacity(strategy.values.len());
        for (column, value) in &strategy.values {
            let rhs = match value {
                Expr::Column(source) => format!("VALUES({})", self.column_name(source)),
                other => other.build_expr(self, ctx)?,
            };
            updates.push(format!("{}={}", self.column_name(column), rhs));
        }
        Ok(format!(" ON DUPLICATE KEY UPDATE {}", updates.join(",")))
    }

    fn date_add(&self, lhs: &str, amount: i64, unit: IntervalUnit) -> String {
        format!("DATE_ADD({}, INTERVAL {} {})", lhs, amount, unit.keyword())
    }

    fn date_sub(&self, lhs: &str, amount: i64, unit: IntervalUnit) -> String {
        format!("DATE_SUB({}, INTERVAL {} {})", lhs, amount, unit.keyword())
    }

    fn regex_match(&self, lhs: &str, rhs: &str) -> String {
        format!("{} REGEXP {}", lhs, rhs)
    }

    fn current_table(&self) -> String {
        self.column_name("CURRENT_TABLE")
    }

    fn current_column(&self, name: &str, _ctx: &ParamContext) -> RelmapResult<String> {
        Ok(self.column_name(name))
    }

    fn truncate(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.table_name(table))
    }

    fn start_transaction(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn add_enum_value(
        &self,
        alter: &AlterTable,
        column: &Column,
        value: &str,
        ctx: &mut ParamContext,
    ) -> RelmapResult<String> {
        let mut column = column.clone();
        if let ColumnKind::Enum { values } = &mut column.kind
            && !values.iter().any(|v| v == value)
        {
            values.push(value.to_string());
        }
        Ok(format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.table_name(&alter.table),
            self.column_definition(&column, ctx)?
        ))
    }

    fn modify_column(&self, column: &Column, ctx: &mut ParamContext) -> RelmapResult<String> {
        Ok(format!("MODIFY COLUMN {}", self.column_definition(column, ctx)?))
    }

    fn drop_primary_key(&self, _table: &str) -> String {
        "DROP PRIMARY KEY".to_string()
    }

    fn reset_auto_increment(&self, table: &str) -> String {
        format!("ALTER TABLE {} AUTO_INCREMENT=1", self.table_name(table))
    }

    fn create_procedure(&self, procedure: &CreateProcedure) -> RelmapResult<String> {
        let mut params = Vec::with_capacity(procedure.params.len());
        for param in &procedure.params {
            let column = param.column();
            params.push(format!("IN {} {}", column.name, self.column_type(&column)?));
        }
        let body = procedure_body(self, procedure)?;
        Ok(format!(
            "CREATE PROCEDURE {}({}) BEGIN {} END;",
            procedure.name,
            params.join(","),
            body
        ))
    }

    fn trigger_body(&self, trigger: &CreateTrigger, procedure: &CreateProcedure) -> RelmapResult<String> {
        let mut args = Vec::with_capacity(trigger.arguments.len());
        for arg in &trigger.arguments {
            args.push(match arg {
                Expr::CurrentTable => self.string_literal(&trigger.table),
                Expr::CurrentColumn(name) => {
                    format!("{}.{}", trigger.event.row_alias(), self.quote_identifier(name))
                }
                Expr::Value(v) => self.literal(v),
                other => other.build_expr(self, &mut ParamContext::inline())?,
            });
        }
        Ok(format!("CALL {}({})", procedure.name, args.join(",")))
    }

    fn trigger_if_not_exists(&self) -> (&'static str, &'static str) {
        ("", " IF NOT EXISTS")
    }
}

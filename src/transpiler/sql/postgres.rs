use crate::ast::{Expr, IntervalUnit};
use crate::error::{RelmapError, RelmapResult};
use crate::query::{AlterTable, CreateProcedure, CreateTrigger, ProcedureParam, UpdateStrategy};
use crate::schema::{Column, ColumnKind};
use crate::transpiler::expr::ExprToSql;
use crate::transpiler::routines::procedure_body;
use crate::transpiler::traits::SqlGenerator;
use crate::transpiler::{Dialect, ParamContext};

/// PostgreSQL Generator.
pub struct PostgresGenerator;

impl PostgresGenerator {
    /// Name of the type backing an enum column: `<column>_type`.
    pub fn enum_type_name(column: &str) -> String {
        if column.ends_with("_type") {
            column.to_string()
        } else {
            format!("{}_type", column)
        }
    }

    fn create_enum_statement(&self, type_name: &str, values: &[String]) -> String {
        let values = values
            .iter()
            .map(|v| self.string_literal(v))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "DO $$ BEGIN CREATE TYPE {} AS ENUM ({}); EXCEPTION WHEN duplicate_object THEN null; END $$;",
            self.quote_identifier(type_name),
            values
        )
    }
}

impl SqlGenerator for PostgresGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_alias(&self, alias: &str) -> String {
        self.quote_identifier(alias)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn column_type(&self, column: &Column) -> RelmapResult<String> {
        Ok(match &column.kind {
            ColumnKind::String { max_size: Some(n) } if *n > 0 => format!("VARCHAR({})", n),
            ColumnKind::String { .. } => "TEXT".to_string(),
            ColumnKind::Serial => "SERIAL".to_string(),
            ColumnKind::Int { big: true, .. } => "BIGINT".to_string(),
            ColumnKind::Int { .. } => "INTEGER".to_string(),
            ColumnKind::DateTime => "TIMESTAMP".to_string(),
            ColumnKind::Bool => "BOOLEAN".to_string(),
            ColumnKind::Json => "JSON".to_string(),
            ColumnKind::Float => "REAL".to_string(),
            ColumnKind::Double => "DOUBLE PRECISION".to_string(),
            ColumnKind::Numeric {
                digits,
                decimal_digits,
            } => match (digits, decimal_digits) {
                (Some(d), Some(s)) => format!("NUMERIC({},{})", d, s),
                (Some(d), None) => format!("NUMERIC({})", d),
                _ => "NUMERIC".to_string(),
            },
            ColumnKind::Enum { .. } => self.quote_identifier(&Self::enum_type_name(&column.name)),
        })
    }

    fn column_definition(&self, column: &Column, ctx: &mut ParamContext) -> RelmapResult<String> {
        if let ColumnKind::Enum { values } = &column.kind {
            if values.is_empty() {
                return Err(RelmapError::build(format!(
                    "Enum column '{}' has no values",
                    column.name
                )));
            }
            let type_name = Self::enum_type_name(&column.name);
            ctx.add_setup(self.create_enum_statement(&type_name, values));
        }
        let sql_type = self.column_type(column)?;
        Ok(self.render_column(column, &sql_type, column.default.as_ref()))
    }

    fn on_duplicate(&self, strategy: &UpdateStrategy, ctx: &mut ParamContext) -> RelmapResult<String> {
        if strategy.conflicting_columns.is_empty() {
            return Err(RelmapError::build("ON CONFLICT requires at least one conflicting column."));
        }
        let mut updates = Vec::with_capacity(strategy.values.len());
        for (column, value) in &strategy.values {
            let rhs = match value {
                Expr::Column(source) => format!("EXCLUDED.{}", self.column_name(source)),
                other => other.build_expr(self, ctx)?,
            };
            updates.push(format!("{}={}", self.column_name(column), rhs));
        }
        Ok(format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            self.column_names(&strategy.conflicting_columns),
            updates.join(",")
        ))
    }

    fn returning(&self, column: &str) -> String {
        format!(" RETURNING {}", self.column_name(column))
    }

    fn date_add(&self, lhs: &str, amount: i64, unit: IntervalUnit) -> String {
        format!("{} + INTERVAL '{} {}'", lhs, amount, unit.keyword())
    }

    fn date_sub(&self, lhs: &str, amount: i64, unit: IntervalUnit) -> String {
        format!("{} - INTERVAL '{} {}'", lhs, amount, unit.keyword())
    }

    fn regex_match(&self, lhs: &str, rhs: &str) -> String {
        format!("{} ~ {}", lhs, rhs)
    }

    fn current_table(&self) -> String {
        "TG_TABLE_NAME".to_string()
    }

    /// Trigger functions take no declared parameters: constants arrive through
    /// `TG_ARGV` and row columns are read from `NEW`/`OLD`.
    fn current_column(&self, name: &str, ctx: &ParamContext) -> RelmapResult<String> {
        let params = ctx.routine_params();
        let mut argument_index = 0;
        for param in params {
            if let ProcedureParam::Argument(column) = param {
                if column.name == name {
                    return Ok(format!(
                        "CAST(TG_ARGV[{}] AS {})",
                        argument_index,
                        self.column_type(column)?
                    ));
                }
                argument_index += 1;
            }
        }
        let column = self.quote_identifier(name);
        Ok(format!(
            "(CASE WHEN TG_OP = 'DELETE' THEN OLD.{} ELSE NEW.{} END)",
            column, column
        ))
    }

    fn truncate(&self, table: &str) -> String {
        format!("TRUNCATE {}", self.table_name(table))
    }

    fn start_transaction(&self) -> &'static str {
        "BEGIN"
    }

    fn add_enum_value(
        &self,
        _alter: &AlterTable,
        column: &Column,
        value: &str,
        _ctx: &mut ParamContext,
    ) -> RelmapResult<String> {
        Ok(format!(
            "ALTER TYPE {} ADD VALUE {}",
            self.column_type(column)?,
            self.string_literal(value)
        ))
    }

    fn modify_column(&self, column: &Column, ctx: &mut ParamContext) -> RelmapResult<String> {
        let name = self.column_name(&column.name);
        let sql_type = self.column_type(column)?;
        if column.kind.is_enum() {
            self.column_definition(column, ctx)?;
        }
        let nullability = if column.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
        Ok(format!(
            "ALTER COLUMN {} TYPE {}, ALTER COLUMN {} {}",
            name, sql_type, name, nullability
        ))
    }

    fn drop_primary_key(&self, table: &str) -> String {
        format!("DROP CONSTRAINT {}", self.quote_identifier(&format!("{}_pkey", table)))
    }

    fn reset_auto_increment(&self, table: &str) -> String {
        format!(
            "ALTER SEQUENCE {} RESTART WITH 1",
            self.quote_identifier(&format!("{}_id_seq", table))
        )
    }

    fn create_procedure(&self, procedure: &CreateProcedure) -> RelmapResult<String> {
        let head = if procedure.returns_trigger {
            format!(
                "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$",
                self.table_name(&procedure.name)
            )
        } else {
            let mut params = Vec::with_capacity(procedure.params.len());
            for param in &procedure.params {
                let column = param.column();
                params.push(format!("{} {}", column.name, self.column_type(&column)?));
            }
            format!(
                "CREATE OR REPLACE FUNCTION {}({}) RETURNS void AS $$",
                self.table_name(&procedure.name),
                params.join(",")
            )
        };

        let mut body = procedure_body(self, procedure)?;
        if procedure.returns_trigger {
            body.push_str("RETURN NEW;");
        }
        Ok(format!("{} BEGIN {} END; $$ LANGUAGE plpgsql;", head, body))
    }

    fn trigger_body(&self, trigger: &CreateTrigger, procedure: &CreateProcedure) -> RelmapResult<String> {
        // only constants travel as trigger arguments
        let args = trigger
            .arguments
            .iter()
            .filter_map(|arg| match arg {
                Expr::Value(v) => Some(self.string_literal(&v.to_text().unwrap_or_default())),
                _ => None,
            })
            .collect::<Vec<_>>();
        Ok(format!(
            "EXECUTE PROCEDURE {}({})",
            self.table_name(&procedure.name),
            args.join(",")
        ))
    }

    fn trigger_if_not_exists(&self) -> (&'static str, &'static str) {
        (" OR REPLACE", "")
    }
}

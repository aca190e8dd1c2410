//! Expression rendering.

use crate::ast::{Expr, Value};
use crate::error::RelmapResult;
use crate::transpiler::conditions::ConditionToSql;
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

pub trait ExprToSql {
    fn build_expr(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String>;
}

impl ExprToSql for Expr {
    fn build_expr(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        Ok(match self {
            Expr::Column(name) => generator.column_name(name),
            Expr::Value(value) => ctx.add_param(value, generator),
            Expr::Keyword(raw) => raw.clone(),
            Expr::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            Expr::Count(None) => "COUNT(*) AS count".to_string(),
            Expr::Count(Some(column)) => {
                let alias = format!("{}_count", column.replace('.', "_").to_lowercase());
                format!("COUNT({}) AS {}", generator.column_name(column), alias)
            }
            Expr::Distinct(column) => format!("DISTINCT({})", generator.column_name(column)),
            Expr::Sum { expr, alias } => format!(
                "SUM({}) AS {}",
                expr.build_expr(generator, ctx)?,
                generator.column_name(alias)
            ),
            Expr::Coalesce(values) => {
                let parts = values
                    .iter()
                    .map(|v| v.build_expr(generator, ctx))
                    .collect::<RelmapResult<Vec<_>>>()?;
                format!("COALESCE({})", parts.join(","))
            }
            Expr::CaseWhen {
                condition,
                then,
                otherwise,
            } => format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                condition.build_condition(generator, ctx)?,
                generator.literal(then),
                generator.literal(otherwise)
            ),
            Expr::DateAdd { expr, amount, unit } => {
                let lhs = expr.build_expr(generator, ctx)?;
                generator.date_add(&lhs, *amount, *unit)
            }
            Expr::DateSub { expr, amount, unit } => {
                let lhs = expr.build_expr(generator, ctx)?;
                generator.date_sub(&lhs, *amount, *unit)
            }
            Expr::Alias { expr, alias } => format!(
                "{} AS {}",
                expr.build_expr(generator, ctx)?,
                generator.quote_alias(alias)
            ),
            Expr::SubQuery(select) => format!("({})", select.build(generator, ctx)?),
            Expr::CurrentTable => generator.current_table(),
            Expr::CurrentColumn(name) => generator.current_column(name, ctx)?,
        })
    }
}

/// Render a row value for INSERT or UPDATE. NULL is written literally so
/// PostgreSQL never has to infer the type of an untyped NULL parameter.
pub fn row_value(expr: &Expr, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
    match expr {
        Expr::Value(Value::Null) => Ok("NULL".to_string()),
        other => other.build_expr(generator, ctx),
    }
}

use crate::ast::{Condition, Expr, InList, Value};
use crate::error::{RelmapError, RelmapResult};
use crate::transpiler::expr::ExprToSql;
use crate::transpiler::{ParamContext, SqlGenerator, ToSql};

/// Extension trait to render a [`Condition`] to SQL.
pub trait ConditionToSql {
    fn build_condition(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String>;
}

impl ConditionToSql for Condition {
    fn build_condition(&self, generator: &dyn SqlGenerator, ctx: &mut ParamContext) -> RelmapResult<String> {
        match self {
            Condition::Compare { left, op, right } => {
                let lhs = left.build_expr(generator, ctx)?;
                if matches!(right, Expr::Value(Value::Null)) {
                    return Ok(if op.is_negation() {
                        format!("{} IS NOT NULL", lhs)
                    } else {
                        format!("{} IS NULL", lhs)
                    });
                }
                let rhs = right.build_expr(generator, ctx)?;
                Ok(format!("{}{}{}", lhs, op.sql_symbol(), rhs))
            }
            Condition::And(list) => Ok(format!("({})", join(list, " AND ", generator, ctx)?)),
            Condition::Or(list) => Ok(format!("({})", join(list, " OR ", generator, ctx)?)),
            Condition::Bool(expr) => expr.build_expr(generator, ctx),
            Condition::Not(inner) => Ok(format!("NOT {}", inner.build_condition(generator, ctx)?)),
            Condition::In { needle, haystack } => {
                let lhs = needle.build_expr(generator, ctx)?;
                let values = match haystack {
                    InList::Values(values) if values.is_empty() => {
                        return Err(RelmapError::build("IN condition requires at least one value"));
                    }
                    InList::Values(values) => values
                        .iter()
                        .map(|v| ctx.add_param(v, generator))
                        .collect::<Vec<_>>()
                        .join(","),
                    InList::SubQuery(select) => select.build(generator, ctx)?,
                };
                Ok(format!("{} IN ({})", lhs, values))
            }
            Condition::Keyword { left, keyword, right } => Ok(format!(
                "{} {} {}",
                left.build_expr(generator, ctx)?,
                keyword,
                right.build_expr(generator, ctx)?
            )),
            Condition::Null(expr) => Ok(format!("{} IS NULL", expr.build_expr(generator, ctx)?)),
            Condition::Exists(select) => Ok(format!("EXISTS({})", select.build(generator, ctx)?)),
            Condition::Regex { left, right } => {
                let lhs = left.build_expr(generator, ctx)?;
                let rhs = right.build_expr(generator, ctx)?;
                Ok(generator.regex_match(&lhs, &rhs))
            }
        }
    }
}

fn join(
    list: &[Condition],
    separator: &str,
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> RelmapResult<String> {
    Ok(list
        .iter()
        .map(|c| c.build_condition(generator, ctx))
        .collect::<RelmapResult<Vec<_>>>()?
        .join(separator))
}

/// Render a top-level condition list: members are AND-joined without
/// surrounding parentheses.
pub fn build_conditions(
    conditions: &[Condition],
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> RelmapResult<String> {
    join(conditions, " AND ", generator, ctx)
}

/// `" WHERE ..."`, or nothing for an empty list.
pub fn where_clause(
    conditions: &[Condition],
    generator: &dyn SqlGenerator,
    ctx: &mut ParamContext,
) -> RelmapResult<String> {
    if conditions.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" WHERE {}", build_conditions(conditions, generator, ctx)?))
}
